//! Ward-level device board: one summary per configured device category.

use chrono::FixedOffset;
use serde::Serialize;

use crate::model::*;
use crate::scheduler::OccupancyScheduler;
use crate::snapshot::AllocationRecord;
use crate::timestamp::{NO_INSTANT, format_instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOccupancy {
    pub category: Category,
    pub summary: OccupancySummary,
}

/// Row labels of the ward board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKey {
    Free,
    Wearing,
    Waiting,
    NextFree,
}

impl TrackerKey {
    pub const ALL: [TrackerKey; 4] = [
        TrackerKey::Free,
        TrackerKey::Wearing,
        TrackerKey::Waiting,
        TrackerKey::NextFree,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackerKey::Free => "free",
            TrackerKey::Wearing => "wearing",
            TrackerKey::Waiting => "waiting",
            TrackerKey::NextFree => "next_free",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerRow {
    pub key: TrackerKey,
    pub category: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct WardTracker {
    categories: Vec<Category>,
    scheduler: OccupancyScheduler,
    offset: FixedOffset,
}

impl WardTracker {
    pub fn new(categories: Vec<Category>, scheduler: OccupancyScheduler, offset: FixedOffset) -> Self {
        Self {
            categories,
            scheduler,
            offset,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.matches(name))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn allocations(&self, records: &[AllocationRecord]) -> Vec<Allocation> {
        records.iter().map(|r| r.to_allocation(self.offset)).collect()
    }

    /// Summaries for every configured category, in configuration order.
    /// Categories never share capacity; each is solved on its own slice.
    pub fn summarize(&self, allocations: &[Allocation], now: Ms) -> Vec<CategoryOccupancy> {
        for a in allocations {
            if self.category(&a.category).is_none() {
                tracing::debug!(id = %a.id, category = %a.category, "allocation for unknown category ignored");
            }
        }
        self.categories
            .iter()
            .map(|category| self.summarize_category(category, allocations, now))
            .collect()
    }

    pub fn summarize_category(&self, category: &Category, allocations: &[Allocation], now: Ms) -> CategoryOccupancy {
        let own: Vec<Allocation> = allocations
            .iter()
            .filter(|a| category.matches(&a.category))
            .cloned()
            .collect();
        CategoryOccupancy {
            category: category.clone(),
            summary: self.scheduler.summarize(&own, category.capacity, now),
        }
    }

    /// Ward display form of a next-available instant.
    pub fn display_next(&self, next: NextAvailable) -> String {
        next.instant()
            .and_then(|t| format_instant(t, self.offset))
            .unwrap_or_else(|| NO_INSTANT.to_string())
    }

    /// Board rows, grouped by key, then by category.
    pub fn rows(&self, occupancy: &[CategoryOccupancy]) -> Vec<TrackerRow> {
        let mut rows = Vec::with_capacity(TrackerKey::ALL.len() * occupancy.len());
        for key in TrackerKey::ALL {
            for entry in occupancy {
                let s = &entry.summary;
                let value = match key {
                    TrackerKey::Free => s.free_count.to_string(),
                    TrackerKey::Wearing => s.active_count.to_string(),
                    TrackerKey::Waiting => s.pending_count.to_string(),
                    TrackerKey::NextFree => self.display_next(s.next_available),
                };
                rows.push(TrackerRow {
                    key,
                    category: entry.category.name.clone(),
                    value,
                });
            }
        }
        rows
    }
}
