use crate::types::{
    FieldArray, GateArray, MetadataValue, RayArray, SweepGeometrySource, VolumeError,
    VolumeResult, DEFAULT_FILL_VALUE,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Range;

/// One named field: quantized measurements plus its missing-value sentinel
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub data: FieldArray,
    pub fill_value: f32,
}

impl FieldData {
    pub fn new(data: FieldArray) -> Self {
        Self {
            data,
            fill_value: DEFAULT_FILL_VALUE,
        }
    }

    /// Whether a sample carries the missing-value sentinel
    pub fn is_missing(&self, value: f32) -> bool {
        value == self.fill_value || !value.is_finite()
    }
}

/// Unvalidated components of a volume, assembled by a decoder or producer
#[derive(Debug, Clone)]
pub struct VolumeParts {
    pub sweep_start_ray_index: Vec<usize>,
    pub sweep_end_ray_index: Vec<usize>,
    pub fixed_angle: Vec<f64>,
    pub geometry_source: Vec<SweepGeometrySource>,
    pub azimuth: RayArray,
    pub elevation: RayArray,
    pub time: RayArray,
    pub epoch: DateTime<Utc>,
    pub range_gate_centers: GateArray,
    pub range_start_offset: f64,
    pub range_gate_spacing: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub fields: BTreeMap<String, FieldData>,
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// Canonical in-memory model of one radar volume scan.
///
/// Flat ray-indexed coordinate arrays, a shared gate axis, named measurement
/// fields and the sweep partition. Constructed once and validated; the only
/// permitted mutation afterwards is inserting a new field of matching shape.
#[derive(Debug, Clone)]
pub struct VolumeModel {
    sweep_count: usize,
    ray_count: usize,
    gate_count: usize,
    parts: VolumeParts,
}

impl VolumeModel {
    /// Validate the cross-array invariants and freeze the model.
    ///
    /// Azimuth values are wrapped into `[0, 360)` on construction; every
    /// other invariant violation is an error.
    pub fn new(mut parts: VolumeParts) -> VolumeResult<Self> {
        let sweep_count = parts.sweep_start_ray_index.len();
        let ray_count = parts.azimuth.len();
        let gate_count = parts.range_gate_centers.len();

        if parts.sweep_end_ray_index.len() != sweep_count {
            return Err(VolumeError::IndexRange(format!(
                "{} sweep start indices but {} end indices",
                sweep_count,
                parts.sweep_end_ray_index.len()
            )));
        }
        if parts.fixed_angle.len() != sweep_count {
            return Err(VolumeError::ShapeMismatch(format!(
                "{} fixed angles for {} sweeps",
                parts.fixed_angle.len(),
                sweep_count
            )));
        }
        if parts.geometry_source.len() != sweep_count {
            return Err(VolumeError::ShapeMismatch(format!(
                "{} geometry sources for {} sweeps",
                parts.geometry_source.len(),
                sweep_count
            )));
        }
        if parts.elevation.len() != ray_count || parts.time.len() != ray_count {
            return Err(VolumeError::ShapeMismatch(format!(
                "ray arrays disagree: azimuth={}, elevation={}, time={}",
                ray_count,
                parts.elevation.len(),
                parts.time.len()
            )));
        }

        Self::validate_partition(
            &parts.sweep_start_ray_index,
            &parts.sweep_end_ray_index,
            ray_count,
        )?;
        Self::validate_range_axis(
            &parts.range_gate_centers,
            parts.range_start_offset,
            parts.range_gate_spacing,
        )?;

        for (name, field) in &parts.fields {
            if field.data.dim() != (ray_count, gate_count) {
                return Err(VolumeError::ShapeMismatch(format!(
                    "field '{}' has shape {:?}, expected ({}, {})",
                    name,
                    field.data.dim(),
                    ray_count,
                    gate_count
                )));
            }
        }

        parts.azimuth.mapv_inplace(crate::core::geometry::wrap_degrees);

        log::debug!(
            "Validated volume: {} sweeps, {} rays, {} gates, {} fields",
            sweep_count,
            ray_count,
            gate_count,
            parts.fields.len()
        );

        Ok(Self {
            sweep_count,
            ray_count,
            gate_count,
            parts,
        })
    }

    fn validate_partition(
        starts: &[usize],
        ends: &[usize],
        ray_count: usize,
    ) -> VolumeResult<()> {
        if starts.is_empty() {
            return Err(VolumeError::IndexRange("volume has no sweeps".to_string()));
        }
        if starts[0] != 0 {
            return Err(VolumeError::IndexRange(format!(
                "first sweep starts at ray {}, expected 0",
                starts[0]
            )));
        }
        for i in 0..starts.len() {
            if ends[i] < starts[i] {
                return Err(VolumeError::IndexRange(format!(
                    "sweep {} ends at ray {} before its start {}",
                    i, ends[i], starts[i]
                )));
            }
            if i > 0 && starts[i] != ends[i - 1] + 1 {
                return Err(VolumeError::IndexRange(format!(
                    "sweep {} starts at ray {} but sweep {} ends at ray {}",
                    i,
                    starts[i],
                    i - 1,
                    ends[i - 1]
                )));
            }
        }
        let last = ends[ends.len() - 1];
        if last + 1 != ray_count {
            return Err(VolumeError::IndexRange(format!(
                "last sweep ends at ray {} but volume has {} rays",
                last, ray_count
            )));
        }
        Ok(())
    }

    fn validate_range_axis(centers: &GateArray, start: f64, spacing: f64) -> VolumeResult<()> {
        if centers.is_empty() {
            return Err(VolumeError::InconsistentGeometry(
                "volume has no range gates".to_string(),
            ));
        }
        if spacing <= 0.0 {
            return Err(VolumeError::InconsistentGeometry(format!(
                "non-positive gate spacing {}",
                spacing
            )));
        }
        // tolerance scaled to spacing so long range axes do not false-positive
        let tol = spacing * 1e-6;
        for (g, &center) in centers.iter().enumerate() {
            let expected = start + g as f64 * spacing;
            if (center - expected).abs() > tol {
                return Err(VolumeError::InconsistentGeometry(format!(
                    "gate {} center {} m, expected {} m",
                    g, center, expected
                )));
            }
        }
        Ok(())
    }

    pub fn sweep_count(&self) -> usize {
        self.sweep_count
    }

    pub fn ray_count(&self) -> usize {
        self.ray_count
    }

    pub fn gate_count(&self) -> usize {
        self.gate_count
    }

    /// Half-open ray index range covered by sweep `i`
    pub fn sweep_slice(&self, i: usize) -> Range<usize> {
        self.parts.sweep_start_ray_index[i]..self.parts.sweep_end_ray_index[i] + 1
    }

    pub fn rays_per_sweep(&self, i: usize) -> usize {
        self.sweep_slice(i).len()
    }

    /// Sweep containing the given ray index
    pub fn sweep_for_ray(&self, ray: usize) -> Option<usize> {
        (0..self.sweep_count).find(|&i| self.sweep_slice(i).contains(&ray))
    }

    pub fn sweep_start_ray_index(&self) -> &[usize] {
        &self.parts.sweep_start_ray_index
    }

    pub fn sweep_end_ray_index(&self) -> &[usize] {
        &self.parts.sweep_end_ray_index
    }

    pub fn fixed_angle(&self) -> &[f64] {
        &self.parts.fixed_angle
    }

    pub fn geometry_source(&self) -> &[SweepGeometrySource] {
        &self.parts.geometry_source
    }

    pub fn azimuth(&self) -> &RayArray {
        &self.parts.azimuth
    }

    pub fn elevation(&self) -> &RayArray {
        &self.parts.elevation
    }

    /// Ray times in seconds since the volume epoch
    pub fn time(&self) -> &RayArray {
        &self.parts.time
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.parts.epoch
    }

    pub fn range_gate_centers(&self) -> &GateArray {
        &self.parts.range_gate_centers
    }

    pub fn range_start_offset(&self) -> f64 {
        self.parts.range_start_offset
    }

    pub fn range_gate_spacing(&self) -> f64 {
        self.parts.range_gate_spacing
    }

    pub fn latitude(&self) -> f64 {
        self.parts.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.parts.longitude
    }

    pub fn altitude_m(&self) -> f64 {
        self.parts.altitude_m
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldData> {
        &self.parts.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldData> {
        self.parts.fields.get(name)
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.parts.metadata
    }

    /// Insert a new field, e.g. from a downstream retrieval algorithm.
    ///
    /// The only permitted mutation after construction. An existing field of
    /// the same name is replaced.
    pub fn add_field(&mut self, name: &str, field: FieldData) -> VolumeResult<()> {
        if field.data.dim() != (self.ray_count, self.gate_count) {
            return Err(VolumeError::ShapeMismatch(format!(
                "field '{}' has shape {:?}, expected ({}, {})",
                name,
                field.data.dim(),
                self.ray_count,
                self.gate_count
            )));
        }
        self.parts.fields.insert(name.to_string(), field);
        Ok(())
    }
}
