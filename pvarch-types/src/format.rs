use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiverError;

/// Output format selected by the request path suffix (`getData.<ext>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum OutputFormat {
    /// Length-prefixed protobuf chunks.
    Raw,
    /// JSON array of PV objects.
    Json,
    /// Comma-separated values.
    Csv,
    /// Plain text listing.
    Txt,
    /// MATLAB binary.
    Mat,
    /// Inline SVG sparkline.
    Svg,
    /// JSON shaped for the plotting client.
    Jplot,
    /// XML for the Flex viewer.
    Flx,
}

impl OutputFormat {
    /// Every supported format, in the order they are listed in error messages.
    pub const ALL: [Self; 8] = [
        Self::Raw,
        Self::Svg,
        Self::Json,
        Self::Jplot,
        Self::Csv,
        Self::Flx,
        Self::Txt,
        Self::Mat,
    ];

    /// Path extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Mat => "mat",
            Self::Svg => "svg",
            Self::Jplot => "jplot",
            Self::Flx => "flx",
        }
    }

    /// `Content-Type` the serializer for this format emits.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Raw => "application/x-protobuf",
            Self::Json | Self::Jplot => "application/json",
            Self::Csv => "text/csv",
            Self::Txt => "text/plain",
            Self::Mat => "application/matlab",
            Self::Svg => "image/svg+xml",
            Self::Flx => "text/xml",
        }
    }

    /// Resolve an extension, reporting the supported list when unknown.
    ///
    /// # Errors
    /// Returns `ArchiverError::UnsupportedFormat` for unknown extensions.
    pub fn from_extension(ext: &str) -> Result<Self, ArchiverError> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == ext)
            .ok_or_else(|| ArchiverError::UnsupportedFormat {
                requested: ext.to_string(),
                supported: Self::ALL
                    .iter()
                    .map(|f| f.extension().to_string())
                    .collect(),
            })
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}
