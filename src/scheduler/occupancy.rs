use crate::model::*;

// ── Occupancy Classification ──────────────────────────────────────

/// Does this allocation take a unit away from immediate use at `now`?
///
/// Active: always. The device is on a patient, its timestamp is irrelevant.
/// Pending: only if its window overlaps the look-ahead `[now, now + duration)`.
/// A pending allocation without a usable start is assumed imminent.
pub fn occupies_now(allocation: &Allocation, now: Ms, duration: Ms) -> bool {
    match allocation.status {
        AllocationStatus::Active => true,
        AllocationStatus::Pending => match allocation.window(duration) {
            Some(window) => window.overlaps(&Span::starting_at(now, duration)),
            None => true,
        },
        AllocationStatus::Completed | AllocationStatus::Other => false,
    }
}

pub fn occupied_count(allocations: &[Allocation], now: Ms, duration: Ms) -> u32 {
    allocations
        .iter()
        .filter(|a| occupies_now(a, now, duration))
        .count() as u32
}

/// `capacity - occupied`, clamped at zero.
pub fn free_count(capacity: u32, occupied: u32) -> u32 {
    capacity.saturating_sub(occupied)
}

/// Raw status tallies; no overlap filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub active: u32,
    pub pending: u32,
}

impl StatusCounts {
    pub fn tally(allocations: &[Allocation]) -> Self {
        let mut counts = Self::default();
        for a in allocations {
            match a.status {
                AllocationStatus::Active => counts.active += 1,
                AllocationStatus::Pending => counts.pending += 1,
                AllocationStatus::Completed | AllocationStatus::Other => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Ms = 1_000 * DAY;

    fn alloc(start: Option<Ms>, status: AllocationStatus) -> Allocation {
        Allocation::new("x", "ECG", start, status)
    }

    #[test]
    fn active_occupies_regardless_of_start() {
        for start in [None, Some(NOW - 30 * DAY), Some(NOW), Some(NOW + 30 * DAY)] {
            assert!(occupies_now(&alloc(start, AllocationStatus::Active), NOW, DAY));
        }
    }

    #[test]
    fn pending_within_lookahead_occupies() {
        assert!(occupies_now(&alloc(Some(NOW), AllocationStatus::Pending), NOW, DAY));
        assert!(occupies_now(&alloc(Some(NOW + 23 * HOUR), AllocationStatus::Pending), NOW, DAY));
        // started 23h ago, still running for another hour
        assert!(occupies_now(&alloc(Some(NOW - 23 * HOUR), AllocationStatus::Pending), NOW, DAY));
    }

    #[test]
    fn pending_beyond_lookahead_does_not_occupy() {
        assert!(!occupies_now(&alloc(Some(NOW + DAY), AllocationStatus::Pending), NOW, DAY));
        assert!(!occupies_now(&alloc(Some(NOW + 30 * HOUR), AllocationStatus::Pending), NOW, DAY));
    }

    #[test]
    fn stale_pending_does_not_occupy() {
        // window [now-24h, now) ends exactly at now: half-open, no overlap
        assert!(!occupies_now(&alloc(Some(NOW - DAY), AllocationStatus::Pending), NOW, DAY));
        assert!(!occupies_now(&alloc(Some(NOW - 3 * DAY), AllocationStatus::Pending), NOW, DAY));
    }

    #[test]
    fn untimed_pending_is_assumed_imminent() {
        assert!(occupies_now(&alloc(None, AllocationStatus::Pending), NOW, DAY));
    }

    #[test]
    fn history_never_occupies() {
        for status in [AllocationStatus::Completed, AllocationStatus::Other] {
            assert!(!occupies_now(&alloc(Some(NOW), status), NOW, DAY));
            assert!(!occupies_now(&alloc(None, status), NOW, DAY));
        }
    }

    #[test]
    fn free_count_clamps_at_zero() {
        assert_eq!(free_count(2, 0), 2);
        assert_eq!(free_count(2, 1), 1);
        assert_eq!(free_count(2, 5), 0);
        assert_eq!(free_count(0, 0), 0);
    }

    #[test]
    fn tally_counts_raw_statuses() {
        let allocs = vec![
            alloc(Some(NOW + 10 * DAY), AllocationStatus::Pending),
            alloc(None, AllocationStatus::Pending),
            alloc(Some(NOW), AllocationStatus::Active),
            alloc(Some(NOW), AllocationStatus::Completed),
            alloc(Some(NOW), AllocationStatus::Other),
        ];
        assert_eq!(
            StatusCounts::tally(&allocs),
            StatusCounts { active: 1, pending: 2 }
        );
        assert_eq!(occupied_count(&allocs, NOW, DAY), 2);
    }
}
