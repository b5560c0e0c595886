use crate::config::FieldTable;
use crate::core::geometry::{reconstruct_sweep, SweepAttributes};
use crate::core::volume::{FieldData, VolumeModel, VolumeParts};
use crate::io::container::VolumeContainer;
use crate::types::{
    FieldArray, MetadataValue, SweepGeometrySource, VolumeError, VolumeResult,
    DEFAULT_FILL_VALUE,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// The only supported top-level scan object kind (polar volume)
const VOLUME_OBJECT: &str = "PVOL";

/// Per-sweep bookkeeping carried from attribute parsing into field decoding
struct SweepRecord {
    group: String,
    start_ray: usize,
    nrays: usize,
}

/// Decode a sweep-grouped hierarchical container into a [`VolumeModel`].
///
/// Fails with `UnsupportedObjectType` for anything but a polar volume and
/// with `InconsistentGeometry` when the gate geometry differs across sweeps.
/// Optional per-sweep metadata selects geometry fallback tiers per sweep;
/// its absence is never fatal.
pub fn decode_volume<C: VolumeContainer>(
    container: &C,
    field_table: &FieldTable,
) -> VolumeResult<VolumeModel> {
    let (sweeps, mut parts, quantities) = decode_structure(container, field_table)?;

    for (quantity, field_name) in &quantities {
        let data = build_field_array(
            container,
            &sweeps,
            quantity,
            parts.range_gate_centers.len(),
        )?;
        parts.fields.insert(field_name.clone(), FieldData::new(data));
    }

    VolumeModel::new(parts)
}

/// Parallel variant of [`decode_volume`]: fields decode concurrently, each
/// worker owning one quantity's full ray-by-gate array.
#[cfg(feature = "parallel")]
pub fn decode_volume_parallel<C: VolumeContainer + Sync>(
    container: &C,
    field_table: &FieldTable,
) -> VolumeResult<VolumeModel> {
    use rayon::prelude::*;

    let (sweeps, mut parts, quantities) = decode_structure(container, field_table)?;
    let gate_count = parts.range_gate_centers.len();

    let decoded: Vec<(String, FieldArray)> = quantities
        .par_iter()
        .map(|(quantity, field_name)| {
            build_field_array(container, &sweeps, quantity, gate_count)
                .map(|data| (field_name.clone(), data))
        })
        .collect::<VolumeResult<_>>()?;

    for (field_name, data) in decoded {
        parts.fields.insert(field_name, FieldData::new(data));
    }

    VolumeModel::new(parts)
}

/// Everything except field data: sweep enumeration, geometry, metadata.
///
/// Returns the sweep records, the model parts with empty fields, and the
/// (source quantity, target field name) pairs to decode.
fn decode_structure<C: VolumeContainer>(
    container: &C,
    field_table: &FieldTable,
) -> VolumeResult<(Vec<SweepRecord>, VolumeParts, Vec<(String, String)>)> {
    let object = container
        .attr_str("what", "object")
        .ok_or_else(|| VolumeError::Metadata("missing what:object attribute".to_string()))?;
    if object != VOLUME_OBJECT {
        return Err(VolumeError::UnsupportedObjectType(object));
    }

    let datasets = sorted_sweep_groups(container);
    if datasets.is_empty() {
        return Err(VolumeError::Metadata(
            "container has no sweep groups".to_string(),
        ));
    }
    log::info!("decoding polar volume with {} sweeps", datasets.len());

    // per-sweep attributes and gate geometry
    let mut attrs = Vec::with_capacity(datasets.len());
    let mut rstart_km = Vec::with_capacity(datasets.len());
    let mut rscale_m = Vec::with_capacity(datasets.len());
    let mut nbins = Vec::with_capacity(datasets.len());
    for ds in &datasets {
        let (sweep_attrs, range) = read_sweep_attributes(container, ds)?;
        attrs.push(sweep_attrs);
        rstart_km.push(range.0);
        rscale_m.push(range.1);
        nbins.push(range.2);
    }

    for (label, values) in [
        ("range start", &rstart_km),
        ("gate spacing", &rscale_m),
    ] {
        if values.iter().any(|v| *v != values[0]) {
            return Err(VolumeError::InconsistentGeometry(format!(
                "{} changes between sweeps: {:?}",
                label, values
            )));
        }
    }
    if nbins.iter().any(|n| *n != nbins[0]) {
        return Err(VolumeError::InconsistentGeometry(format!(
            "gate count changes between sweeps: {:?}",
            nbins
        )));
    }
    let gate_count = nbins[0];
    let range_start_offset = rstart_km[0] * 1000.0;
    let range_gate_spacing = rscale_m[0];

    // sweep partition from cumulative ray counts
    let mut starts = Vec::with_capacity(datasets.len());
    let mut ends = Vec::with_capacity(datasets.len());
    let mut cursor = 0usize;
    for a in &attrs {
        starts.push(cursor);
        ends.push(cursor + a.nrays.saturating_sub(1));
        cursor += a.nrays;
    }
    let ray_count = cursor;

    // geometry reconstruction, one independent tier choice per sweep
    let mut azimuth = Array1::zeros(ray_count);
    let mut elevation = Array1::zeros(ray_count);
    let mut abs_time = Array1::zeros(ray_count);
    let mut geometry_source: Vec<SweepGeometrySource> = Vec::with_capacity(datasets.len());
    for (i, a) in attrs.iter().enumerate() {
        let geom = reconstruct_sweep(a)?;
        log::debug!(
            "sweep {}: elevation={:?} azimuth={:?} time={:?}",
            i,
            geom.source.elevation,
            geom.source.azimuth,
            geom.source.time
        );
        let slice = starts[i]..ends[i] + 1;
        for (offset, ray) in slice.enumerate() {
            azimuth[ray] = geom.azimuth[offset];
            elevation[ray] = geom.elevation[offset];
            abs_time[ray] = geom.time[offset];
        }
        geometry_source.push(geom.source);
    }

    // rebase times on the volume epoch (minimum ray timestamp)
    let epoch_seconds = abs_time.iter().cloned().fold(f64::INFINITY, f64::min);
    let epoch = DateTime::from_timestamp(
        epoch_seconds.floor() as i64,
        ((epoch_seconds - epoch_seconds.floor()) * 1e9) as u32,
    )
    .ok_or_else(|| {
        VolumeError::InsufficientMetadata(format!(
            "ray timestamp {} outside representable range",
            epoch_seconds
        ))
    })?;
    let time = abs_time.mapv(|t| t - epoch_seconds);

    let range_gate_centers = Array1::from_iter(
        (0..gate_count).map(|g| g as f64 * range_gate_spacing + range_start_offset),
    );

    // site location
    let latitude = required_f64(container, "where", "lat")?;
    let longitude = required_f64(container, "where", "lon")?;
    let altitude_m = required_f64(container, "where", "height")?;

    let metadata = collect_metadata(container, &datasets[0]);

    let quantities = discover_quantities(container, &datasets[0], field_table);

    let sweeps = datasets
        .into_iter()
        .zip(&attrs)
        .zip(&starts)
        .map(|((group, a), &start_ray)| SweepRecord {
            group,
            start_ray,
            nrays: a.nrays,
        })
        .collect();

    let fixed_angle = attrs.iter().map(|a| a.fixed_angle).collect();
    let parts = VolumeParts {
        sweep_start_ray_index: starts,
        sweep_end_ray_index: ends,
        fixed_angle,
        geometry_source,
        azimuth,
        elevation,
        time,
        epoch,
        range_gate_centers,
        range_start_offset,
        range_gate_spacing,
        latitude,
        longitude,
        altitude_m,
        fields: BTreeMap::new(),
        metadata,
    };

    Ok((sweeps, parts, quantities))
}

/// Root children named `dataset*`, sorted numerically so `dataset10` follows
/// `dataset9`
fn sorted_sweep_groups<C: VolumeContainer>(container: &C) -> Vec<String> {
    let mut groups: Vec<String> = container
        .group_names("")
        .into_iter()
        .filter(|name| name.starts_with("dataset"))
        .collect();
    groups.sort_by_key(|name| numeric_suffix(name, "dataset"));
    groups
}

fn numeric_suffix(name: &str, prefix: &str) -> u64 {
    name.strip_prefix(prefix)
        .and_then(|s| s.parse().ok())
        .unwrap_or(u64::MAX)
}

fn required_f64<C: VolumeContainer>(container: &C, path: &str, key: &str) -> VolumeResult<f64> {
    container
        .attr_f64(path, key)
        .ok_or_else(|| VolumeError::Metadata(format!("missing {}:{} attribute", path, key)))
}

fn required_i64<C: VolumeContainer>(container: &C, path: &str, key: &str) -> VolumeResult<i64> {
    container
        .attr_i64(path, key)
        .ok_or_else(|| VolumeError::Metadata(format!("missing {}:{} attribute", path, key)))
}

/// Read one sweep's attribute bundle plus its (rstart_km, rscale_m, nbins)
fn read_sweep_attributes<C: VolumeContainer>(
    container: &C,
    dataset: &str,
) -> VolumeResult<(SweepAttributes, (f64, f64, usize))> {
    let where_path = format!("{}/where", dataset);
    let how_path = format!("{}/how", dataset);
    let what_path = format!("{}/what", dataset);

    let nrays = required_i64(container, &where_path, "nrays")? as usize;
    let fixed_angle = required_f64(container, &where_path, "elangle")?;
    let a1gate = required_i64(container, &where_path, "a1gate")? as usize;
    let rstart_km = required_f64(container, &where_path, "rstart")?;
    let rscale_m = required_f64(container, &where_path, "rscale")?;
    let nbins = required_i64(container, &where_path, "nbins")? as usize;

    // an absent how group degrades to an empty attribute set
    let attrs = SweepAttributes {
        nrays,
        fixed_angle,
        a1gate,
        elevation_samples: container.attr_f64_array(&how_path, "elangles"),
        start_azimuth: container.attr_f64_array(&how_path, "startazA"),
        stop_azimuth: container.attr_f64_array(&how_path, "stopazA"),
        start_time: container.attr_f64_array(&how_path, "startazT"),
        stop_time: container.attr_f64_array(&how_path, "stopazT"),
        start_datetime: parse_sweep_datetime(container, &what_path, "startdate", "starttime"),
        end_datetime: parse_sweep_datetime(container, &what_path, "enddate", "endtime"),
    };

    Ok((attrs, (rstart_km, rscale_m, nbins)))
}

/// Parse a `YYYYMMDD` + `HHMMSS` attribute pair into a UTC datetime
fn parse_sweep_datetime<C: VolumeContainer>(
    container: &C,
    path: &str,
    date_key: &str,
    time_key: &str,
) -> Option<DateTime<Utc>> {
    let date = container.attr_str(path, date_key)?;
    let time = container.attr_str(path, time_key)?;
    let joined = format!("{}{}", date, time);
    match NaiveDateTime::parse_from_str(&joined, "%Y%m%d%H%M%S") {
        Ok(dt) => Some(dt.and_utc()),
        Err(e) => {
            log::warn!("unparseable sweep datetime '{}': {}", joined, e);
            None
        }
    }
}

/// Root and first-sweep metadata scalars
fn collect_metadata<C: VolumeContainer>(
    container: &C,
    first_dataset: &str,
) -> BTreeMap<String, MetadataValue> {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "original_container".to_string(),
        MetadataValue::from("odim_h5"),
    );
    metadata.insert("scan_type".to_string(), MetadataValue::from("ppi"));

    if let Some(conventions) = container.attr_str("", "Conventions") {
        metadata.insert("conventions".to_string(), MetadataValue::Str(conventions));
    }
    for key in ["source", "version"] {
        if let Some(value) = container.attr_str("what", key) {
            metadata.insert(key.to_string(), MetadataValue::Str(value));
        }
    }
    let how_path = format!("{}/how", first_dataset);
    // the system attribute names the instrument, which the encoder reuses
    if let Some(value) = container.attr_str(&how_path, "system") {
        metadata.insert("instrument".to_string(), MetadataValue::Str(value));
    }
    for key in ["software", "sw_version"] {
        if let Some(value) = container.attr_str(&how_path, key) {
            metadata.insert(key.to_string(), MetadataValue::Str(value));
        }
    }
    metadata
}

/// Quantities present in the first sweep, mapped to target field names.
///
/// Unmapped or excluded quantities are dropped here.
fn discover_quantities<C: VolumeContainer>(
    container: &C,
    first_dataset: &str,
    field_table: &FieldTable,
) -> Vec<(String, String)> {
    let mut children: Vec<String> = container
        .group_names(first_dataset)
        .into_iter()
        .filter(|name| name.starts_with("data") && !name.starts_with("dataset"))
        .collect();
    children.sort_by_key(|name| numeric_suffix(name, "data"));

    let mut quantities = Vec::new();
    for child in children {
        let what_path = format!("{}/{}/what", first_dataset, child);
        let Some(quantity) = container.attr_str(&what_path, "quantity") else {
            log::warn!("{} has no quantity attribute, skipping", what_path);
            continue;
        };
        match field_table.target_name(&quantity) {
            Some(field_name) => quantities.push((quantity, field_name)),
            None => log::debug!("dropping unmapped or excluded quantity '{}'", quantity),
        }
    }
    quantities
}

/// Decode one quantity across every sweep into a full ray-by-gate array.
///
/// Sweeps missing the quantity leave their slice at the fill value rather
/// than exposing zeros as valid measurements.
fn build_field_array<C: VolumeContainer>(
    container: &C,
    sweeps: &[SweepRecord],
    quantity: &str,
    gate_count: usize,
) -> VolumeResult<FieldArray> {
    let ray_count: usize = sweeps.iter().map(|s| s.nrays).sum();
    let mut data = Array2::from_elem((ray_count, gate_count), DEFAULT_FILL_VALUE);

    for sweep in sweeps {
        let Some(child) = field_child_for_quantity(container, &sweep.group, quantity) else {
            log::warn!(
                "quantity '{}' absent from {}, leaving its rays masked",
                quantity,
                sweep.group
            );
            continue;
        };
        let dpath = format!("{}/{}", sweep.group, child);
        let sweep_data = decode_sweep_field(container, &dpath, sweep.nrays, gate_count)?;
        data.slice_mut(ndarray::s![
            sweep.start_ray..sweep.start_ray + sweep.nrays,
            ..
        ])
        .assign(&sweep_data);
    }
    Ok(data)
}

/// Child group of a sweep holding the given quantity
fn field_child_for_quantity<C: VolumeContainer>(
    container: &C,
    dataset: &str,
    quantity: &str,
) -> Option<String> {
    container
        .group_names(dataset)
        .into_iter()
        .filter(|name| name.starts_with("data") && !name.starts_with("dataset"))
        .find(|child| {
            let what_path = format!("{}/{}/what", dataset, child);
            container.attr_str(&what_path, "quantity").as_deref() == Some(quantity)
        })
}

/// Decode one sweep's raw samples: mask the nodata sentinel, mask the
/// undetect sentinel, then apply `raw * gain + offset`.
fn decode_sweep_field<C: VolumeContainer>(
    container: &C,
    dpath: &str,
    nrays: usize,
    gate_count: usize,
) -> VolumeResult<FieldArray> {
    let raw = container
        .data_array(dpath)
        .ok_or_else(|| VolumeError::Metadata(format!("missing sample data under {}", dpath)))?;
    if raw.dim() != (nrays, gate_count) {
        return Err(VolumeError::ShapeMismatch(format!(
            "{} has shape {:?}, expected ({}, {})",
            dpath,
            raw.dim(),
            nrays,
            gate_count
        )));
    }

    let what_path = format!("{}/what", dpath);
    let nodata = container.attr_f64(&what_path, "nodata");
    let undetect = container.attr_f64(&what_path, "undetect");
    let gain = container.attr_f64(&what_path, "gain").unwrap_or(1.0);
    let offset = container.attr_f64(&what_path, "offset").unwrap_or(0.0);

    Ok(raw.mapv(|sample| {
        if nodata == Some(sample) || undetect == Some(sample) {
            DEFAULT_FILL_VALUE
        } else {
            (sample * gain + offset) as f32
        }
    }))
}
