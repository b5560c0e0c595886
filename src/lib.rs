//! radbridge: A Fast, Modular Weather-Radar Volume Format Bridge
//!
//! This library reconstructs a canonical radar volume model from a
//! sweep-grouped hierarchical container (ODIM-style attribute schema) and
//! projects it back out to the legacy Universal Format binary transport.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::core::{FieldData, VolumeModel, VolumeParts};
pub use config::FieldTable;
pub use io::{decode_volume, write_volume, MemoryContainer, UfConfig, VolumeContainer};
pub use types::{
    GeometrySource, MetadataValue, SweepGeometrySource, VolumeError, VolumeResult,
    DEFAULT_FILL_VALUE,
};
