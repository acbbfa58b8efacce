use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const HOUR: Ms = 3_600_000;
pub const DAY: Ms = 24 * HOUR;

/// Every allocation of a device runs for one full day.
pub const DEFAULT_DURATION: Ms = DAY;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Span of `duration` beginning at `start`. A non-positive duration
    /// gives an empty span that overlaps nothing.
    pub fn starting_at(start: Ms, duration: Ms) -> Self {
        Self {
            start,
            end: start.saturating_add(duration.max(0)),
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Intersection with `window`, or `None` when they do not overlap.
    pub fn clip_to(&self, window: &Span) -> Option<Span> {
        if !self.overlaps(window) {
            return None;
        }
        Some(Span::new(
            self.start.max(window.start),
            self.end.min(window.end),
        ))
    }
}

/// Lifecycle state of an allocation as reported by the record store.
///
/// The store writes its own labels ("Chưa lắp", "Đang lắp", ...); both those
/// and the English names are accepted. Anything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    #[serde(alias = "Chưa lắp", alias = "Pending", alias = "PENDING")]
    Pending,
    #[serde(alias = "Đang lắp", alias = "Active", alias = "ACTIVE")]
    Active,
    #[serde(alias = "Đã tháo", alias = "Completed", alias = "COMPLETED")]
    Completed,
    #[serde(other)]
    Other,
}

impl AllocationStatus {
    /// Only pending and active allocations hold devices.
    pub fn participates(self) -> bool {
        match self {
            AllocationStatus::Pending | AllocationStatus::Active => true,
            AllocationStatus::Completed | AllocationStatus::Other => false,
        }
    }
}

/// One reservation of a shared device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub category: String,
    /// `None` when the store's timestamp was missing or unparseable.
    pub start: Option<Ms>,
    pub status: AllocationStatus,
}

impl Allocation {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        start: Option<Ms>,
        status: AllocationStatus,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            start,
            status,
        }
    }

    /// Busy window `[start, start + duration)`, if the start is known.
    pub fn window(&self, duration: Ms) -> Option<Span> {
        self.start.map(|s| Span::starting_at(s, duration))
    }
}

/// A pool of interchangeable devices with its own fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub capacity: u32,
}

impl Category {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// Earliest start for a new full-duration allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAvailable {
    At(Ms),
    /// No feasible start among the candidate instants.
    Unknown,
}

impl NextAvailable {
    pub fn instant(self) -> Option<Ms> {
        match self {
            NextAvailable::At(t) => Some(t),
            NextAvailable::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancySummary {
    pub free_count: u32,
    pub active_count: u32,
    pub pending_count: u32,
    pub next_available: NextAvailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_clip() {
        let window = Span::new(100, 200);
        assert_eq!(Span::new(50, 150).clip_to(&window), Some(Span::new(100, 150)));
        assert_eq!(Span::new(120, 180).clip_to(&window), Some(Span::new(120, 180)));
        assert_eq!(Span::new(0, 500).clip_to(&window), Some(window));
        assert_eq!(Span::new(200, 300).clip_to(&window), None);
        assert_eq!(Span::new(0, 100).clip_to(&window), None);
    }

    #[test]
    fn allocation_window() {
        let a = Allocation::new("a", "ECG", Some(1_000), AllocationStatus::Pending);
        assert_eq!(a.window(DAY), Some(Span::new(1_000, 1_000 + DAY)));
        let b = Allocation::new("b", "ECG", None, AllocationStatus::Pending);
        assert_eq!(b.window(DAY), None);
    }

    #[test]
    fn status_participation() {
        assert!(AllocationStatus::Pending.participates());
        assert!(AllocationStatus::Active.participates());
        assert!(!AllocationStatus::Completed.participates());
        assert!(!AllocationStatus::Other.participates());
    }

    #[test]
    fn status_accepts_store_labels() {
        let parse = |s: &str| -> AllocationStatus {
            serde_json::from_value(serde_json::Value::String(s.into())).unwrap()
        };
        assert_eq!(parse("pending"), AllocationStatus::Pending);
        assert_eq!(parse("Chưa lắp"), AllocationStatus::Pending);
        assert_eq!(parse("Đang lắp"), AllocationStatus::Active);
        assert_eq!(parse("active"), AllocationStatus::Active);
        assert_eq!(parse("Đã tháo"), AllocationStatus::Completed);
        assert_eq!(parse("Khác"), AllocationStatus::Other);
        assert_eq!(parse("something new"), AllocationStatus::Other);
    }

    #[test]
    fn category_matching_ignores_case_and_padding() {
        let c = Category::new("ECG", 2);
        assert!(c.matches("ecg"));
        assert!(c.matches(" ECG "));
        assert!(!c.matches("HA"));
    }

    #[test]
    fn next_available_instant() {
        assert_eq!(NextAvailable::At(5).instant(), Some(5));
        assert_eq!(NextAvailable::Unknown.instant(), None);
    }
}
