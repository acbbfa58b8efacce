use crate::model::*;

// ── Next-Available-Slot Search ────────────────────────────────────

/// Busy windows of every participating allocation, sorted by start.
///
/// Allocations without a usable start define no window and no candidate
/// instant, so the search never sees them. They may still block `now`
/// through the occupancy count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusyProfile {
    pub spans: Vec<Span>,
}

impl BusyProfile {
    pub fn collect(allocations: &[Allocation], duration: Ms) -> Self {
        let mut profile = Self::default();
        for allocation in allocations.iter().filter(|a| a.status.participates()) {
            match allocation.window(duration) {
                Some(span) if span.start < span.end => profile.spans.push(span),
                Some(_) => {}
                None => {
                    tracing::debug!(
                        id = %allocation.id,
                        "allocation without start excluded from busy windows"
                    );
                }
            }
        }
        profile.spans.sort_by_key(|s| s.start);
        profile
    }

    /// Busy windows overlapping `window`.
    /// Binary search skips everything starting at or after `window.end`.
    pub fn overlapping(&self, window: &Span) -> impl Iterator<Item = &Span> {
        let right_bound = self.spans.partition_point(|s| s.start < window.end);
        self.spans[..right_bound]
            .iter()
            .filter(move |s| s.end > window.start)
    }
}

/// `now`, then every busy end after `now`, ascending and deduplicated.
/// A new window can only become feasible when some unit is released.
pub fn candidate_instants(spans: &[Span], now: Ms) -> Vec<Ms> {
    let mut candidates = Vec::with_capacity(spans.len() + 1);
    candidates.push(now);
    candidates.extend(spans.iter().map(|s| s.end).filter(|&end| end > now));
    candidates.sort_unstable();
    candidates.dedup();
    candidates
}

/// Sweep-line event buffer, reused across candidates.
#[derive(Debug, Default)]
pub struct SweepBuffer {
    events: Vec<(Ms, i32)>,
}

impl SweepBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of `spans` simultaneously active inside `window`.
    ///
    /// Spans are clipped to the window first. At equal instants the `-1` of an
    /// ending span is applied before the `+1` of a starting one, so hand-offs
    /// at a boundary never count as overlap.
    pub fn max_concurrency<'a>(
        &mut self,
        spans: impl IntoIterator<Item = &'a Span>,
        window: &Span,
    ) -> u32 {
        self.events.clear();
        for clipped in spans.into_iter().filter_map(|s| s.clip_to(window)) {
            self.events.push((clipped.start, 1));
            self.events.push((clipped.end, -1));
        }
        self.events
            .sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut count: i32 = 0;
        let mut max: i32 = 0;
        for (_, delta) in &self.events {
            count += delta;
            max = max.max(count);
        }
        max as u32
    }
}

/// Earliest candidate `t >= now` at which a `duration`-long window keeps
/// concurrent usage strictly below `capacity`.
pub fn next_available(
    profile: &BusyProfile,
    capacity: u32,
    now: Ms,
    duration: Ms,
) -> NextAvailable {
    if capacity == 0 {
        return NextAvailable::Unknown;
    }

    let mut sweep = SweepBuffer::new();
    for t in candidate_instants(&profile.spans, now) {
        let window = Span::starting_at(t, duration);
        let feasible = if capacity == 1 {
            // Fast path: any overlap saturates a single unit.
            profile.overlapping(&window).next().is_none()
        } else {
            sweep.max_concurrency(profile.overlapping(&window), &window) < capacity
        };
        if feasible {
            return NextAvailable::At(t);
        }
    }
    NextAvailable::Unknown
}
