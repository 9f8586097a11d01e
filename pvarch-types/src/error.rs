use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header added to every error response so browser clients can read the body.
pub const ACCESS_CONTROL_ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");

/// Unified error type for the pvarch workspace.
///
/// Request-level variants map onto HTTP status codes through [`status_code`];
/// tier-level variants are normally logged and swallowed by the orchestrator.
///
/// [`status_code`]: ArchiverError::status_code
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ArchiverError {
    /// Malformed request parameter (bad time syntax, unbalanced parens, bad ranges).
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A PV (or other resource) could not be resolved anywhere.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "type info for SIM:PV1".
        what: String,
    },

    /// The requested output format has no serializer.
    #[error("cannot generate response of type {requested}; supported extensions are {}", supported.join(" "))]
    UnsupportedFormat {
        /// Extension requested by the caller.
        requested: String,
        /// Extensions that are supported.
        supported: Vec<String>,
    },

    /// The service cannot take requests yet (startup not complete, shutting down).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A single tier failed while fetching or streaming.
    #[error("{locator} failed: {msg}")]
    Source {
        /// Locator of the tier that failed.
        locator: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A single tier exceeded the per-unit timeout.
    #[error("source timed out: {locator}")]
    SourceTimeout {
        /// Locator of the tier that timed out.
        locator: String,
    },

    /// A stream reported a sample type that disagrees with the PV's type info.
    #[error("mismatched sample type for {pv}: expected {expected}, found {found}")]
    MismatchedType {
        /// PV name.
        pv: String,
        /// Sample type recorded in the type descriptor.
        expected: String,
        /// Sample type reported by the stream.
        found: String,
    },

    /// A post-processor rejected its arguments during initialization.
    #[error("post processor {identity} failed for {pv}: {msg}")]
    PostProcessor {
        /// Post-processor identifier as given in the request.
        identity: String,
        /// PV the processor was initialized for.
        pv: String,
        /// Reason reported by the processor.
        msg: String,
    },

    /// A proxied request came back with a non-success status.
    #[error("proxy to {target} returned {status}: {body}")]
    Proxy {
        /// Upstream URL the request was forwarded to.
        target: String,
        /// Upstream HTTP status.
        status: u16,
        /// Upstream error body, relayed to the caller.
        body: String,
    },

    /// Transport-level failure talking to another node or external server.
    #[error("http error: {0}")]
    Http(String),

    /// The downstream client disconnected; no further output can be written.
    #[error("client disconnected")]
    ClientGone,

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl ArchiverError {
    /// Helper: build an `InvalidArg` error.
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArg(msg.into())
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `Source` error tagged with the failing tier's locator.
    pub fn source(locator: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            locator: locator.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `SourceTimeout` error.
    pub fn source_timeout(locator: impl Into<String>) -> Self {
        Self::SourceTimeout {
            locator: locator.into(),
        }
    }

    /// Helper: build a `PostProcessor` initialization error.
    pub fn post_processor(
        identity: impl Into<String>,
        pv: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::PostProcessor {
            identity: identity.into(),
            pv: pv.into(),
            msg: msg.into(),
        }
    }

    /// Returns true when the downstream client went away.
    ///
    /// Client aborts are expected during normal operation and are logged at a
    /// lower severity than genuine failures.
    #[must_use]
    pub const fn is_client_gone(&self) -> bool {
        matches!(self, Self::ClientGone)
    }

    /// Returns true if this error should be surfaced to operators as actionable.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self, Self::NotFound { .. } | Self::ClientGone)
    }

    /// HTTP status code used when this error rejects a request.
    ///
    /// `ClientGone` maps to 499, which is never actually sent: the client is gone.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArg(_) => 400,
            Self::NotFound { .. } | Self::PostProcessor { .. } => 404,
            Self::UnsupportedFormat { .. } | Self::ServiceUnavailable(_) => 503,
            Self::Proxy { status, .. } => *status,
            Self::Http(_) | Self::Source { .. } | Self::SourceTimeout { .. } => 502,
            Self::ClientGone => 499,
            Self::MismatchedType { .. } | Self::Other(_) => 500,
        }
    }

    /// Headers that accompany every error response.
    #[must_use]
    pub const fn response_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[ACCESS_CONTROL_ALLOW_ORIGIN]
    }
}
