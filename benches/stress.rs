use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::FixedOffset;
use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls};

use devpool::model::*;
use devpool::scheduler::{OccupancyScheduler, compute_occupancy};
use devpool::service::OccupancyService;
use devpool::snapshot::{AllocationRecord, StaticSource};
use devpool::tracker::WardTracker;
use devpool::wire;

const NOW: Ms = 1_714_552_200_000;

/// Deterministic xorshift so runs are comparable.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next() % (hi - lo) as u64) as i64
    }
}

/// A busy pool: a third of the units on patients, a long queue of fittings.
fn synthetic_pool(rng: &mut Rng, n: usize) -> Vec<Allocation> {
    (0..n)
        .map(|i| {
            let (status, start) = match rng.next() % 6 {
                0 | 1 => (AllocationStatus::Active, NOW - rng.range(0, 23 * HOUR)),
                2 | 3 | 4 => (AllocationStatus::Pending, NOW + rng.range(-2 * HOUR, 14 * DAY)),
                _ => (AllocationStatus::Completed, NOW - rng.range(DAY, 30 * DAY)),
            };
            Allocation::new(i.to_string(), "ECG", Some(start), status)
        })
        .collect()
}

fn synthetic_records(rng: &mut Rng, n: usize) -> Vec<AllocationRecord> {
    let categories = ["ECG", "HA", "SPO2"];
    synthetic_pool(rng, n)
        .into_iter()
        .enumerate()
        .map(|(i, a)| AllocationRecord {
            id: a.id,
            name: Some(format!("unit-{}", i % 40)),
            category: categories[i % categories.len()].to_string(),
            status: a.status,
            patient_name: None,
            room: None,
            install_date: a.start.map(|s| s.to_string()),
            end_time: None,
        })
        .collect()
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn start_server(records: Vec<AllocationRecord>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tracker = WardTracker::new(
        vec![
            Category::new("ECG", 12),
            Category::new("HA", 6),
            Category::new("SPO2", 4),
        ],
        OccupancyScheduler::default(),
        FixedOffset::east_opt(7 * 3600).unwrap(),
    );
    let service = Arc::new(OccupancyService::new(
        Arc::new(StaticSource::new(records)),
        tracker,
    ));

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let service = service.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, service, None).await;
            });
        }
    });
    addr
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("bench")
        .user("bench");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn phase1_scheduler(rng: &mut Rng) {
    for (n, capacity) in [(10, 2), (100, 10), (1_000, 50), (5_000, 200)] {
        let pool = synthetic_pool(rng, n);
        let rounds = 200;
        let mut latencies = Vec::with_capacity(rounds);
        let mut unknown = 0;
        for _ in 0..rounds {
            let t = Instant::now();
            let summary = compute_occupancy(&pool, capacity, NOW, DAY);
            latencies.push(t.elapsed());
            if summary.next_available == NextAvailable::Unknown {
                unknown += 1;
            }
        }
        print_latency(
            &format!("{n} allocations, capacity {capacity} ({unknown} unknown)"),
            &mut latencies,
        );
    }
}

async fn phase2_sequential_queries(addr: SocketAddr) {
    let client = connect(addr).await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let now = NOW + (i as i64) * 60_000;
        let t = Instant::now();
        client
            .simple_query(&format!("SELECT * FROM occupancy WHERE now = {now}"))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let qps = n as f64 / elapsed.as_secs_f64();
    println!("  {n} queries in {:.2}s = {qps:.0} queries/sec", elapsed.as_secs_f64());
    print_latency("occupancy query", &mut latencies);
}

async fn phase3_concurrent_readers(addr: SocketAddr) {
    let n_readers = 10;
    let reads_per_reader = 300;
    let start = Instant::now();
    let mut handles = Vec::new();

    for r in 0..n_readers {
        handles.push(tokio::spawn(async move {
            let client = connect(addr).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let t = Instant::now();
                if (r + i) % 2 == 0 {
                    client
                        .query(
                            "SELECT * FROM occupancy WHERE category = $1",
                            &[&"ECG"],
                        )
                        .await
                        .unwrap();
                } else {
                    client.simple_query("SELECT * FROM tracker").await.unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in handles {
        all_latencies.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    println!(
        "  {n_readers} readers x {reads_per_reader} = {} queries in {:.2}s",
        all_latencies.len(),
        elapsed.as_secs_f64()
    );
    print_latency("mixed read latency", &mut all_latencies);
}

async fn phase4_connection_storm(addr: SocketAddr) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let success = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..n_conns {
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(addr).await;
            for _ in 0..ops_per_conn {
                client.simple_query("SELECT * FROM tracker").await.unwrap();
            }
            success.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(std::sync::atomic::Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let snapshot_size: usize = std::env::var("DEVPOOL_BENCH_RECORDS")
        .unwrap_or_else(|_| "600".into())
        .parse()
        .expect("invalid DEVPOOL_BENCH_RECORDS");

    println!("=== devpool stress benchmark ===");
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);

    println!("\n[phase 1] scheduler, in process");
    phase1_scheduler(&mut rng);

    let addr = start_server(synthetic_records(&mut rng, snapshot_size)).await;
    println!("\nserver: {addr}, snapshot of {snapshot_size} records");

    println!("\n[phase 2] sequential occupancy queries");
    phase2_sequential_queries(addr).await;

    println!("\n[phase 3] concurrent readers");
    phase3_concurrent_readers(addr).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(addr).await;

    println!("\n=== benchmark complete ===");
}
