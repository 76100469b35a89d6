//! Figures attached to test results.

use indexmap::IndexMap;
use serde_json::Value;

use super::value::{NumberMode, ResultValue};
use crate::error::DocResult;

/// Encoding of a figure payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FigureFormat {
    /// PNG bitmap.
    Png,
    /// SVG vector image.
    Svg,
    /// JSON figure specification (e.g. a plotting library's figure dict).
    Json,
}

impl FigureFormat {
    /// Wire name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Json => "json",
        }
    }

    /// MIME type of the payload.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
            Self::Json => "application/json",
        }
    }
}

/// A binary or vector image with a result-unique key.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    key: String,
    format: FigureFormat,
    bytes: Vec<u8>,
    metadata: IndexMap<String, ResultValue>,
}

impl Figure {
    /// PNG figure.
    #[must_use]
    pub fn png(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(key, FigureFormat::Png, bytes)
    }

    /// SVG figure.
    #[must_use]
    pub fn svg(key: impl Into<String>, svg: impl Into<String>) -> Self {
        Self::new(key, FigureFormat::Svg, svg.into().into_bytes())
    }

    /// JSON figure specification.
    #[must_use]
    pub fn json(key: impl Into<String>, spec: &Value) -> Self {
        Self::new(key, FigureFormat::Json, spec.to_string().into_bytes())
    }

    fn new(key: impl Into<String>, format: FigureFormat, bytes: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            format,
            bytes,
            metadata: IndexMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<ResultValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Figure key, unique within the owning result.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Payload format.
    #[must_use]
    pub const fn format(&self) -> FigureFormat {
        self.format
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Free-form metadata.
    #[must_use]
    pub const fn metadata(&self) -> &IndexMap<String, ResultValue> {
        &self.metadata
    }

    /// File name used for the multipart upload.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.key, self.format.as_str())
    }

    /// Metadata encoded as a JSON object.
    ///
    /// # Errors
    ///
    /// Fails in strict mode when metadata holds non-finite numbers.
    pub fn metadata_json(&self, mode: NumberMode) -> DocResult<Value> {
        ResultValue::Map(self.metadata.clone()).encode(mode)
    }

    /// Consume the figure, yielding its key, format, payload and metadata.
    #[must_use]
    pub fn into_parts(self) -> (String, FigureFormat, Vec<u8>, IndexMap<String, ResultValue>) {
        (self.key, self.format, self.bytes, self.metadata)
    }
}
