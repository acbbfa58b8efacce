use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::model::Ms;
use crate::service::{OccupancyService, ServiceError, now_ms};
use crate::tracker::CategoryOccupancy;

/// Background task that periodically recomputes the ward board and
/// publishes it as gauges. Query answers never depend on it.
pub async fn run_refresher(service: Arc<OccupancyService>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = refresh_once(&service, now_ms()).await {
            // Next tick retries with a fresh snapshot.
            tracing::warn!("refresh failed: {e}");
        }
    }
}

/// One recomputation at `now`.
pub async fn refresh_once(
    service: &OccupancyService,
    now: Ms,
) -> Result<Vec<CategoryOccupancy>, ServiceError> {
    let occupancy = service.occupancy(now).await?;
    crate::observability::record_occupancy(&occupancy);
    metrics::counter!(crate::observability::REFRESHES_TOTAL).increment(1);

    for entry in &occupancy {
        let s = &entry.summary;
        info!(
            category = %entry.category.name,
            free = s.free_count,
            wearing = s.active_count,
            waiting = s.pending_count,
            next_free = %service.tracker().display_next(s.next_available),
            "pool refreshed"
        );
    }
    Ok(occupancy)
}
