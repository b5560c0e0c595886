//! Canonical volume model and geometry reconstruction

pub mod geometry;
pub mod volume;

// Re-export main types
pub use geometry::{
    circular_mean_deg, reconstruct_sweep, wrap_degrees, SweepAttributes, SweepGeometry,
};
pub use volume::{FieldData, VolumeModel, VolumeParts};
