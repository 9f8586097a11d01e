//! Merge-dedup admission across tiers.

use chrono::{DateTime, Utc};
use pvarch_types::MergeStats;

use crate::event::Event;

/// Decision for one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Strictly newer than the last emitted event: emit it.
    Emit,
    /// Older than the last emitted event.
    SkipOlder,
    /// Same timestamp and value as the last emitted event.
    SkipDuplicate,
    /// Same timestamp, different value. The earlier tier's value stands.
    SkipConflict,
}

impl Admission {
    /// Whether the event should be forwarded.
    #[must_use]
    pub const fn is_emit(self) -> bool {
        matches!(self, Self::Emit)
    }
}

/// Per-request merge state.
///
/// Tracks the last emitted sample for the PV being streamed and cumulative
/// counters for the whole request. Units must be fed in tier-rank order; the
/// first tier to produce a timestamp wins it.
#[derive(Debug, Default)]
pub struct MergeDedup {
    current_pv: Option<String>,
    last: Option<Event>,
    stats: MergeStats,
}

impl MergeDedup {
    /// Fresh state with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to a new PV, forgetting the last emitted sample. Counters carry over.
    pub fn begin_pv(&mut self, pv: &str) {
        self.current_pv = Some(pv.to_string());
        self.last = None;
    }

    /// PV currently being merged.
    #[must_use]
    pub fn current_pv(&self) -> Option<&str> {
        self.current_pv.as_deref()
    }

    /// Timestamp of the last emitted event for the current PV.
    #[must_use]
    pub fn last_emitted(&self) -> Option<DateTime<Utc>> {
        self.last.as_ref().map(|last| last.ts)
    }

    /// Decide whether `event` is emitted, updating state and counters.
    pub fn admit(&mut self, event: &Event) -> Admission {
        let decision = match &self.last {
            Some(last) if event.ts < last.ts => Admission::SkipOlder,
            Some(last) if event.ts == last.ts => {
                self.stats.compared += 1;
                if event.same_sample(last) {
                    Admission::SkipDuplicate
                } else {
                    Admission::SkipConflict
                }
            }
            _ => Admission::Emit,
        };

        match decision {
            Admission::Emit => {
                self.last = Some(event.clone());
                self.stats.emitted += 1;
            }
            Admission::SkipConflict => {
                self.stats.skipped += 1;
                self.stats.conflicts += 1;
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    pv = self.current_pv.as_deref().unwrap_or_default(),
                    ts = %event.ts,
                    tier = %event.tier,
                    "equal timestamp with different value; keeping earlier tier"
                );
            }
            Admission::SkipOlder | Admission::SkipDuplicate => {
                self.stats.skipped += 1;
            }
        }
        decision
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> MergeStats {
        self.stats
    }
}

/// Merge already-collected unit outputs for one PV, in tier order.
///
/// Convenience over [`MergeDedup`] for callers that hold every unit's events
/// in memory. Returns the emitted events and the counters.
pub fn merge_units<I, U>(pv: &str, units: I) -> (Vec<Event>, MergeStats)
where
    I: IntoIterator<Item = U>,
    U: IntoIterator<Item = Event>,
{
    let mut state = MergeDedup::new();
    state.begin_pv(pv);
    let mut out = Vec::new();
    for unit in units {
        for event in unit {
            if state.admit(&event).is_emit() {
                out.push(event);
            }
        }
    }
    (out, state.stats())
}
