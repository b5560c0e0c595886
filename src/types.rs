use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Ray-indexed coordinate data (azimuth, elevation, time)
pub type RayArray = Array1<f64>;

/// Gate-indexed range data (range gate centers)
pub type GateArray = Array1<f64>;

/// 2D field measurement array (ray x gate)
pub type FieldArray = Array2<f32>;

/// Fill value marking gates with no valid measurement
pub const DEFAULT_FILL_VALUE: f32 = -9999.0;

/// Source strategy used to reconstruct one geometry concern of a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometrySource {
    /// Per-ray samples were present in the sweep metadata
    DirectSamples,
    /// A single per-sweep value was broadcast to every ray
    FixedBroadcast,
    /// Values were interpolated from sweep start/end bounds
    Interpolated,
}

/// Reconstruction strategies chosen for one sweep, one per concern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepGeometrySource {
    pub elevation: GeometrySource,
    pub azimuth: GeometrySource,
    pub time: GeometrySource,
}

/// Scalar metadata value (closed variant set, no open dynamic records)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Str(s) => write!(f, "{}", s),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl MetadataValue {
    /// Borrow the string payload, if this value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

/// Error types for volume decoding, validation and encoding
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported scan object type: {0}")]
    UnsupportedObjectType(String),

    #[error("inconsistent gate geometry: {0}")]
    InconsistentGeometry(String),

    #[error("insufficient sweep metadata: {0}")]
    InsufficientMetadata(String),

    #[error("field shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("sweep index range error: {0}")]
    IndexRange(String),

    #[error("field count overflow: {0}")]
    FieldCountOverflow(String),

    #[error("metadata error: {0}")]
    Metadata(String),
}

/// Result type for volume operations
pub type VolumeResult<T> = Result<T, VolumeError>;
