//! PV type metadata, cluster nodes, source locators and retrieval units.

use core::fmt;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pvarch_types::TimeSpan;
use serde::{Deserialize, Serialize};

use crate::event::TierRank;

/// Wire-level sample type of a PV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum SampleType {
    /// Scalar string.
    ScalarString,
    /// Scalar 16-bit integer.
    ScalarShort,
    /// Scalar 32-bit float.
    ScalarFloat,
    /// Scalar enum index.
    ScalarEnum,
    /// Scalar byte.
    ScalarByte,
    /// Scalar 32-bit integer.
    ScalarInt,
    /// Scalar 64-bit float.
    ScalarDouble,
    /// Waveform of strings.
    WaveformString,
    /// Waveform of 16-bit integers.
    WaveformShort,
    /// Waveform of 32-bit floats.
    WaveformFloat,
    /// Waveform of enum indices.
    WaveformEnum,
    /// Waveform of bytes.
    WaveformByte,
    /// Waveform of 32-bit integers.
    WaveformInt,
    /// Waveform of 64-bit floats.
    WaveformDouble,
}

impl SampleType {
    /// Label used in headers and error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ScalarString => "DBR_SCALAR_STRING",
            Self::ScalarShort => "DBR_SCALAR_SHORT",
            Self::ScalarFloat => "DBR_SCALAR_FLOAT",
            Self::ScalarEnum => "DBR_SCALAR_ENUM",
            Self::ScalarByte => "DBR_SCALAR_BYTE",
            Self::ScalarInt => "DBR_SCALAR_INT",
            Self::ScalarDouble => "DBR_SCALAR_DOUBLE",
            Self::WaveformString => "DBR_WAVEFORM_STRING",
            Self::WaveformShort => "DBR_WAVEFORM_SHORT",
            Self::WaveformFloat => "DBR_WAVEFORM_FLOAT",
            Self::WaveformEnum => "DBR_WAVEFORM_ENUM",
            Self::WaveformByte => "DBR_WAVEFORM_BYTE",
            Self::WaveformInt => "DBR_WAVEFORM_INT",
            Self::WaveformDouble => "DBR_WAVEFORM_DOUBLE",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the engine samples a PV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SamplingMode {
    /// Periodic scan.
    Scan,
    /// Channel Access monitor.
    #[default]
    Monitor,
    /// Not sampled by the engine; only stores (and legacy servers) hold data.
    NotSampled,
}

/// Archiving metadata for a PV, as published by the cluster directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvTypeDescriptor {
    /// Canonical PV name.
    pub pv_name: String,
    /// Wire-level sample type.
    pub sample_type: SampleType,
    /// Number of elements per sample (1 for scalars).
    pub element_count: u32,
    /// Store URLs in tier order; the first entry holds the most recent data.
    pub stores: Vec<String>,
    /// Identity of the node that archives the PV.
    pub owner: String,
    /// When archiving started, if known. Legacy servers cover time before this.
    pub created_at: Option<DateTime<Utc>>,
    /// Engine sampling mode.
    pub sampling: SamplingMode,
    /// Extra fields archived as part of the stream (`HIHI`, `LOLO`, `EGU`, ...).
    pub archived_fields: Vec<String>,
    /// Archiving is paused.
    pub paused: bool,
    /// Observed storage rate, used for memory estimates.
    pub storage_rate_bytes_per_sec: f64,
}

impl PvTypeDescriptor {
    /// Descriptor for a scalar double PV owned by `owner` with the given stores.
    pub fn scalar_double(
        pv_name: impl Into<String>,
        owner: impl Into<String>,
        stores: Vec<String>,
    ) -> Self {
        Self {
            pv_name: pv_name.into(),
            sample_type: SampleType::ScalarDouble,
            element_count: 1,
            stores,
            owner: owner.into(),
            created_at: None,
            sampling: SamplingMode::default(),
            archived_fields: Vec::new(),
            paused: false,
            storage_rate_bytes_per_sec: 0.0,
        }
    }

    /// Whether the engine tier may hold data for this PV.
    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.sampling != SamplingMode::NotSampled
    }

    /// Whether `field` is archived as part of the PV's stream.
    #[must_use]
    pub fn archives_field(&self, field: &str) -> bool {
        self.archived_fields.iter().any(|f| f == field)
    }

    /// Descriptor for a retired PV, cloned from a template.
    ///
    /// The clone is paused, not sampled and owned by `local_identity`, so only
    /// the template's stores are consulted.
    #[must_use]
    pub fn retired_from_template(
        template: &Self,
        pv_name: impl Into<String>,
        local_identity: impl Into<String>,
    ) -> Self {
        Self {
            pv_name: pv_name.into(),
            owner: local_identity.into(),
            sampling: SamplingMode::NotSampled,
            paused: true,
            ..template.clone()
        }
    }
}

/// A node in the archiving cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identity.
    pub identity: String,
    /// Base URL of the node's engine (used for `getMetadata`).
    pub engine_url: String,
    /// Base URL of the node's retrieval service (used for proxying).
    pub retrieval_url: String,
}

/// Where a retrieval unit fetches its data from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SourceLocator {
    /// The owning node's sampling engine.
    Engine {
        /// Engine base URL.
        url: String,
    },
    /// A configured on-disk store.
    Store {
        /// Store URL as configured in the descriptor.
        url: String,
    },
    /// A legacy external archive server.
    Legacy {
        /// Server URL.
        url: String,
        /// Maximum number of samples to request; `None` is unlimited.
        count: Option<u32>,
        /// Server-side retrieval method; 0 is raw.
        how: i32,
    },
}

impl SourceLocator {
    /// URL of the underlying source.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Engine { url } | Self::Store { url } | Self::Legacy { url, .. } => url,
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine { url } => write!(f, "engine {url}"),
            Self::Store { url } => write!(f, "store {url}"),
            Self::Legacy { url, .. } => write!(f, "legacy {url}"),
        }
    }
}

/// One fetch of one PV from one source over one bound span.
///
/// Units order by tier rank, then bound span start. A unit is consumed exactly
/// once by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalUnit {
    pv_name: String,
    locator: SourceLocator,
    tier: TierRank,
    span: TimeSpan,
}

impl RetrievalUnit {
    /// Build a unit.
    pub fn new(
        pv_name: impl Into<String>,
        locator: SourceLocator,
        tier: TierRank,
        span: TimeSpan,
    ) -> Self {
        Self {
            pv_name: pv_name.into(),
            locator,
            tier,
            span,
        }
    }

    /// PV the unit fetches.
    #[must_use]
    pub fn pv_name(&self) -> &str {
        &self.pv_name
    }

    /// Source to fetch from.
    #[must_use]
    pub const fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Tier rank of the source.
    #[must_use]
    pub const fn tier(&self) -> TierRank {
        self.tier
    }

    /// Bound span; always a subset of the requested span.
    #[must_use]
    pub const fn span(&self) -> TimeSpan {
        self.span
    }

    /// Sort key used to order units for draining.
    #[must_use]
    pub fn order_key(&self) -> (TierRank, DateTime<Utc>) {
        (self.tier, self.span.start())
    }
}

/// Description of a stream returned by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDesc {
    /// PV the stream carries.
    pub pv_name: String,
    /// Sample type the source reports.
    pub sample_type: SampleType,
    /// Source-specific headers.
    pub headers: BTreeMap<String, String>,
}

impl StreamDesc {
    /// Description without headers.
    pub fn new(pv_name: impl Into<String>, sample_type: SampleType) -> Self {
        Self {
            pv_name: pv_name.into(),
            sample_type,
            headers: BTreeMap::new(),
        }
    }
}

/// Header handed to the sink when a PV begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvHeader {
    /// PV name as the caller will see it.
    pub pv_name: String,
    /// Sample type from the descriptor, if one exists.
    pub sample_type: Option<SampleType>,
    /// Element count from the descriptor, if one exists.
    pub element_count: Option<u32>,
    /// Post-processor applied to the PV's events.
    pub processor: String,
    /// Extra headers (engine metadata when requested).
    pub headers: BTreeMap<String, String>,
}

/// Trailing record produced by a post-processor after a PV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    /// Processor identity that produced the record.
    pub processor: String,
    /// Record contents.
    pub fields: BTreeMap<String, String>,
}
