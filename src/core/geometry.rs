use crate::types::{GeometrySource, SweepGeometrySource, VolumeError, VolumeResult};
use chrono::{DateTime, Utc};
use ndarray::Array1;

/// Raw per-sweep attribute bundle, independent of any container format.
///
/// `fixed_angle` and `a1gate` are always present in the source schema; the
/// per-ray sample vectors and the sweep start/end datetimes are optional and
/// select the reconstruction tier.
#[derive(Debug, Clone, Default)]
pub struct SweepAttributes {
    pub nrays: usize,
    pub fixed_angle: f64,
    pub a1gate: usize,
    pub elevation_samples: Option<Vec<f64>>,
    pub start_azimuth: Option<Vec<f64>>,
    pub stop_azimuth: Option<Vec<f64>>,
    /// Per-ray start/stop timestamps, seconds since the Unix epoch
    pub start_time: Option<Vec<f64>>,
    pub stop_time: Option<Vec<f64>>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
}

/// Reconstructed per-ray geometry for one sweep.
///
/// Times are absolute seconds since the Unix epoch; the decoder rebases them
/// onto the volume-wide epoch once all sweeps are processed.
#[derive(Debug, Clone)]
pub struct SweepGeometry {
    pub elevation: Vec<f64>,
    pub azimuth: Vec<f64>,
    pub time: Vec<f64>,
    pub source: SweepGeometrySource,
}

/// Wrap an angle in degrees to `[0, 360)`.
///
/// Values within a nanodegree of 360 collapse to 0, so roundoff from the
/// circular mean cannot escape the wrap invariant.
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if 360.0 - wrapped < 1e-9 {
        0.0
    } else {
        wrapped
    }
}

/// Circular mean of two angles in degrees, result wrapped to `[0, 360)`.
///
/// Averaging the unit complex exponentials avoids the 0/360 discontinuity:
/// the mean of 359 and 1 is 0, not 180.
pub fn circular_mean_deg(start: f64, stop: f64) -> f64 {
    let (s_sin, s_cos) = start.to_radians().sin_cos();
    let (e_sin, e_cos) = stop.to_radians().sin_cos();
    let re = (s_cos + e_cos) / 2.0;
    let im = (s_sin + e_sin) / 2.0;
    wrap_degrees(im.atan2(re).to_degrees())
}

/// Reconstruct the per-ray azimuth, elevation and time arrays for one sweep.
///
/// Each concern picks its tier independently based on which optional samples
/// are present, so a volume may mix strategies across sweeps.
pub fn reconstruct_sweep(attrs: &SweepAttributes) -> VolumeResult<SweepGeometry> {
    if attrs.nrays == 0 {
        return Err(VolumeError::InsufficientMetadata(
            "sweep reports zero rays".to_string(),
        ));
    }

    let (elevation, elevation_source) = reconstruct_elevation(attrs);
    let (azimuth, azimuth_source) = reconstruct_azimuth(attrs);
    let (time, time_source) = reconstruct_time(attrs)?;

    Ok(SweepGeometry {
        elevation,
        azimuth,
        time,
        source: SweepGeometrySource {
            elevation: elevation_source,
            azimuth: azimuth_source,
            time: time_source,
        },
    })
}

fn reconstruct_elevation(attrs: &SweepAttributes) -> (Vec<f64>, GeometrySource) {
    if let Some(samples) = &attrs.elevation_samples {
        if samples.len() == attrs.nrays {
            return (samples.clone(), GeometrySource::DirectSamples);
        }
        log::warn!(
            "ignoring {} elevation samples for a {}-ray sweep",
            samples.len(),
            attrs.nrays
        );
    }
    log::debug!(
        "broadcasting fixed angle {:.2} deg to {} rays",
        attrs.fixed_angle,
        attrs.nrays
    );
    (
        vec![attrs.fixed_angle; attrs.nrays],
        GeometrySource::FixedBroadcast,
    )
}

fn reconstruct_azimuth(attrs: &SweepAttributes) -> (Vec<f64>, GeometrySource) {
    if let (Some(start), Some(stop)) = (&attrs.start_azimuth, &attrs.stop_azimuth) {
        if start.len() == attrs.nrays && stop.len() == attrs.nrays {
            let azimuth = start
                .iter()
                .zip(stop)
                .map(|(&a, &b)| circular_mean_deg(a, b))
                .collect();
            return (azimuth, GeometrySource::DirectSamples);
        }
        log::warn!(
            "ignoring azimuth samples of length {}/{} for a {}-ray sweep",
            start.len(),
            stop.len(),
            attrs.nrays
        );
    }
    // assume 1 degree per ray, starting at the a1gate index
    log::debug!(
        "assuming uniform 1 deg/ray azimuth from a1gate {}",
        attrs.a1gate
    );
    let azimuth = (0..attrs.nrays)
        .map(|r| wrap_degrees((attrs.a1gate + r) as f64))
        .collect();
    (azimuth, GeometrySource::Interpolated)
}

fn reconstruct_time(attrs: &SweepAttributes) -> VolumeResult<(Vec<f64>, GeometrySource)> {
    if let (Some(start), Some(stop)) = (&attrs.start_time, &attrs.stop_time) {
        if start.len() == attrs.nrays && stop.len() == attrs.nrays {
            let time = start.iter().zip(stop).map(|(&a, &b)| (a + b) / 2.0).collect();
            return Ok((time, GeometrySource::DirectSamples));
        }
        log::warn!(
            "ignoring time samples of length {}/{} for a {}-ray sweep",
            start.len(),
            stop.len(),
            attrs.nrays
        );
    }

    let (start_dt, end_dt) = match (attrs.start_datetime, attrs.end_datetime) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(VolumeError::InsufficientMetadata(
                "sweep has neither per-ray timestamps nor start/end times".to_string(),
            ))
        }
    };

    let sweep_start = start_dt.timestamp() as f64;
    let delta_seconds = (end_dt - start_dt).num_seconds() as f64;
    let time = Array1::linspace(0.0, delta_seconds, attrs.nrays)
        .iter()
        .map(|offset| sweep_start + offset)
        .collect();
    Ok((time, GeometrySource::Interpolated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn base_attrs(nrays: usize) -> SweepAttributes {
        SweepAttributes {
            nrays,
            fixed_angle: 1.5,
            a1gate: 0,
            start_datetime: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            end_datetime: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 10).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert_eq!(wrap_degrees(-1.0), 359.0);
        assert_eq!(wrap_degrees(725.0), 5.0);
        // a rounding hair below 360 collapses to 0
        assert_eq!(wrap_degrees(-1e-15), 0.0);
    }

    #[test]
    fn test_circular_mean_across_north() {
        assert_abs_diff_eq!(circular_mean_deg(359.0, 1.0), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(circular_mean_deg(10.0, 20.0), 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(circular_mean_deg(350.0, 340.0), 345.0, epsilon = 1e-9);
    }

    #[test]
    fn test_elevation_broadcast_without_samples() {
        let geom = reconstruct_sweep(&base_attrs(4)).unwrap();
        assert_eq!(geom.elevation, vec![1.5; 4]);
        assert_eq!(geom.source.elevation, GeometrySource::FixedBroadcast);
    }

    #[test]
    fn test_elevation_direct_samples() {
        let mut attrs = base_attrs(3);
        attrs.elevation_samples = Some(vec![1.4, 1.5, 1.6]);
        let geom = reconstruct_sweep(&attrs).unwrap();
        assert_eq!(geom.elevation, vec![1.4, 1.5, 1.6]);
        assert_eq!(geom.source.elevation, GeometrySource::DirectSamples);
    }

    #[test]
    fn test_azimuth_circular_mean_of_start_stop() {
        let mut attrs = base_attrs(2);
        attrs.start_azimuth = Some(vec![359.0, 10.0]);
        attrs.stop_azimuth = Some(vec![1.0, 20.0]);
        let geom = reconstruct_sweep(&attrs).unwrap();
        assert_abs_diff_eq!(geom.azimuth[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geom.azimuth[1], 15.0, epsilon = 1e-9);
        assert_eq!(geom.source.azimuth, GeometrySource::DirectSamples);
    }

    #[test]
    fn test_azimuth_uniform_spacing_from_a1gate() {
        let mut attrs = base_attrs(4);
        attrs.a1gate = 358;
        let geom = reconstruct_sweep(&attrs).unwrap();
        assert_eq!(geom.azimuth, vec![358.0, 359.0, 0.0, 1.0]);
        assert_eq!(geom.source.azimuth, GeometrySource::Interpolated);
        assert!(geom.azimuth.iter().all(|&az| (0.0..360.0).contains(&az)));
    }

    #[test]
    fn test_time_interpolated_between_sweep_bounds() {
        let geom = reconstruct_sweep(&base_attrs(5)).unwrap();
        let start = Utc
            .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .unwrap()
            .timestamp() as f64;
        let offsets: Vec<f64> = geom.time.iter().map(|t| t - start).collect();
        for (got, want) in offsets.iter().zip([0.0, 2.5, 5.0, 7.5, 10.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
        }
        assert_eq!(geom.source.time, GeometrySource::Interpolated);
    }

    #[test]
    fn test_time_midpoint_of_samples() {
        let mut attrs = base_attrs(2);
        attrs.start_time = Some(vec![100.0, 102.0]);
        attrs.stop_time = Some(vec![101.0, 103.0]);
        let geom = reconstruct_sweep(&attrs).unwrap();
        assert_eq!(geom.time, vec![100.5, 102.5]);
        assert_eq!(geom.source.time, GeometrySource::DirectSamples);
    }

    #[test]
    fn test_missing_time_sources_is_an_error() {
        let mut attrs = base_attrs(3);
        attrs.start_datetime = None;
        attrs.end_datetime = None;
        assert!(matches!(
            reconstruct_sweep(&attrs),
            Err(VolumeError::InsufficientMetadata(_))
        ));
    }

    #[test]
    fn test_mismatched_samples_fall_back() {
        let mut attrs = base_attrs(4);
        attrs.elevation_samples = Some(vec![1.0, 2.0]); // wrong length
        attrs.start_azimuth = Some(vec![0.0; 3]);
        attrs.stop_azimuth = Some(vec![1.0; 3]);
        let geom = reconstruct_sweep(&attrs).unwrap();
        assert_eq!(geom.source.elevation, GeometrySource::FixedBroadcast);
        assert_eq!(geom.source.azimuth, GeometrySource::Interpolated);
    }
}
