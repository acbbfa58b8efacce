mod next_slot;
mod occupancy;

pub use next_slot::{BusyProfile, SweepBuffer, candidate_instants, next_available};
pub use occupancy::{StatusCounts, free_count, occupied_count, occupies_now};

use crate::model::*;

/// Summarise one device category.
///
/// Pure: the whole summary is rebuilt from `allocations` on every call, so
/// callers re-invoke it after each refresh of the record store instead of
/// patching a previous result. Malformed records never abort the
/// computation. `allocations` must already be filtered to the category.
pub fn compute_occupancy(
    allocations: &[Allocation],
    capacity: u32,
    now: Ms,
    duration: Ms,
) -> OccupancySummary {
    let occupied = occupied_count(allocations, now, duration);
    let counts = StatusCounts::tally(allocations);
    let profile = BusyProfile::collect(allocations, duration);

    OccupancySummary {
        free_count: free_count(capacity, occupied),
        active_count: counts.active,
        pending_count: counts.pending,
        next_available: next_available(&profile, capacity, now, duration),
    }
}

/// Carries the allocation duration so call sites only supply the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyScheduler {
    duration: Ms,
}

impl Default for OccupancyScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION)
    }
}

impl OccupancyScheduler {
    pub fn new(duration: Ms) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Ms {
        self.duration
    }

    pub fn summarize(&self, allocations: &[Allocation], capacity: u32, now: Ms) -> OccupancySummary {
        compute_occupancy(allocations, capacity, now, self.duration)
    }
}
