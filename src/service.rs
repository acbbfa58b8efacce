//! Query-facing engine. Owns nothing but the snapshot source and the ward
//! configuration; every call reloads the records and recomputes from scratch.

use std::sync::Arc;

use crate::model::*;
use crate::snapshot::{SnapshotError, SnapshotSource};
use crate::tracker::{CategoryOccupancy, TrackerRow, WardTracker};

pub struct OccupancyService {
    source: Arc<dyn SnapshotSource>,
    tracker: WardTracker,
}

impl OccupancyService {
    pub fn new(source: Arc<dyn SnapshotSource>, tracker: WardTracker) -> Self {
        Self { source, tracker }
    }

    pub fn tracker(&self) -> &WardTracker {
        &self.tracker
    }

    async fn load(&self) -> Result<Vec<Allocation>, ServiceError> {
        let records = self.source.load().await.map_err(|e| {
            metrics::counter!(crate::observability::SNAPSHOT_LOAD_FAILURES_TOTAL).increment(1);
            ServiceError::Snapshot(e)
        })?;
        Ok(self.tracker.allocations(&records))
    }

    /// One summary per configured category.
    pub async fn occupancy(&self, now: Ms) -> Result<Vec<CategoryOccupancy>, ServiceError> {
        let allocations = self.load().await?;
        Ok(self.tracker.summarize(&allocations, now))
    }

    pub async fn category_occupancy(
        &self,
        name: &str,
        now: Ms,
    ) -> Result<CategoryOccupancy, ServiceError> {
        let category = self
            .tracker
            .category(name)
            .ok_or_else(|| ServiceError::UnknownCategory(name.to_string()))?;
        let allocations = self.load().await?;
        Ok(self.tracker.summarize_category(category, &allocations, now))
    }

    pub async fn tracker_rows(&self, now: Ms) -> Result<Vec<TrackerRow>, ServiceError> {
        let occupancy = self.occupancy(now).await?;
        Ok(self.tracker.rows(&occupancy))
    }
}

/// Wall-clock now. A clock before the epoch reads as 0.
pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

#[derive(Debug)]
pub enum ServiceError {
    Snapshot(SnapshotError),
    UnknownCategory(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Snapshot(e) => write!(f, "snapshot unavailable: {e}"),
            ServiceError::UnknownCategory(name) => write!(f, "unknown device category: {name}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Snapshot(e) => Some(e),
            ServiceError::UnknownCategory(_) => None,
        }
    }
}
