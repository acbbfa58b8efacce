use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use devpool::config::Config;
use devpool::scheduler::OccupancyScheduler;
use devpool::service::OccupancyService;
use devpool::snapshot::JsonFileSource;
use devpool::tracker::WardTracker;
use devpool::{refresher, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    devpool::observability::init(config.metrics_port)?;

    let tls_acceptor =
        devpool::tls::load_tls_acceptor(config.tls_cert.as_deref(), config.tls_key.as_deref())?;

    let tracker = WardTracker::new(
        config.categories.clone(),
        OccupancyScheduler::new(config.duration),
        config.utc_offset,
    );
    let source = Arc::new(JsonFileSource::new(config.snapshot_paths.clone()));
    let service = Arc::new(OccupancyService::new(source, tracker));
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("devpool listening on {addr}");
    info!("  snapshot: {:?}", config.snapshot_paths);
    info!(
        "  categories: {}",
        config
            .categories
            .iter()
            .map(|c| format!("{}={}", c.name, c.capacity))
            .collect::<Vec<_>>()
            .join(",")
    );
    info!("  duration: {}h, utc offset: {}", config.duration / devpool::model::HOUR, config.utc_offset);
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    if config.refresh_secs > 0 {
        tokio::spawn(refresher::run_refresher(
            service.clone(),
            Duration::from_secs(config.refresh_secs),
        ));
        info!("  refresh: every {}s", config.refresh_secs);
    } else {
        info!("  refresh: disabled");
    }

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(devpool::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(devpool::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(devpool::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let service = service.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = wire::process_connection(socket, service, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(devpool::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    info!("devpool stopped");
    Ok(())
}
