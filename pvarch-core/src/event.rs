//! Timestamped samples and the tier they came from.

use core::fmt;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a data source in the retrieval hierarchy.
///
/// Lower ranks hold more recent data and win equal-timestamp conflicts:
/// the engine is rank 0, stores follow in configured order, legacy servers last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TierRank(pub u32);

impl TierRank {
    /// The live sampling engine.
    pub const ENGINE: Self = Self(0);

    /// Rank of the store at `index` in the descriptor's store list.
    #[must_use]
    pub const fn store(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    /// Rank of the `index`-th legacy server for a PV with `store_count` stores.
    #[must_use]
    pub const fn legacy(store_count: usize, index: usize) -> Self {
        Self((store_count + index) as u32 + 1)
    }
}

impl fmt::Display for TierRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier-{}", self.0)
    }
}

/// Sample payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SampleValue {
    /// Floating-point scalar (DOUBLE/FLOAT).
    Double(f64),
    /// Integer scalar (INT/SHORT/ENUM/BYTE).
    Int(i64),
    /// String scalar.
    Text(String),
    /// Numeric waveform.
    Vector(Vec<f64>),
}

impl SampleValue {
    /// Numeric view of a scalar value; `None` for strings and waveforms.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Text(_) | Self::Vector(_) => None,
        }
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One archived sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sample timestamp.
    pub ts: DateTime<Utc>,
    /// Sample payload.
    pub value: SampleValue,
    /// Alarm severity.
    pub severity: i32,
    /// Alarm status.
    pub status: i32,
    /// Extra fields archived alongside the value (`HIHI`, `EGU`, ...).
    pub fields: Option<BTreeMap<String, String>>,
    /// Tier that produced the event.
    pub tier: TierRank,
}

impl Event {
    /// Event with no alarm and no extra fields, tagged with the engine tier.
    pub fn new(ts: DateTime<Utc>, value: impl Into<SampleValue>) -> Self {
        Self {
            ts,
            value: value.into(),
            severity: 0,
            status: 0,
            fields: None,
            tier: TierRank::ENGINE,
        }
    }

    /// Same event tagged with a different tier.
    #[must_use]
    pub fn with_tier(mut self, tier: TierRank) -> Self {
        self.tier = tier;
        self
    }

    /// Same event carrying one extra field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Dedup identity: equal timestamp and equal value. Tier, alarm and fields are ignored.
    #[must_use]
    pub fn same_sample(&self, other: &Self) -> bool {
        self.ts == other.ts && self.value == other.value
    }
}
