use crate::core::volume::VolumeModel;
use crate::types::{VolumeError, VolumeResult};
use chrono::{Datelike, Duration, NaiveDate, Timelike, Utc};
use std::io::Write;

/// 16-bit words in the mandatory header
const MANDATORY_WORDS: usize = 45;
/// 16-bit words in the optional header
const OPTIONAL_WORDS: usize = 14;
/// 16-bit words in the data header, before the field directory
const DATA_HEADER_WORDS: usize = 3;
/// 16-bit words per field header, including the 12 reserved bytes
const FIELD_HEADER_WORDS: usize = 25;
/// Directory entry per field: 2-byte tag plus header position word
const DIRECTORY_WORDS_PER_FIELD: usize = 2;

/// Encoder configuration for header words the model cannot supply.
///
/// Site coordinates, angles and timestamps come from the model; names,
/// the fixed-point scale and the generation date come from here.
#[derive(Debug, Clone)]
pub struct UfConfig {
    pub volume_number: i16,
    /// Radar name override; defaults to the model's `instrument`/`source` metadata
    pub radar_name: Option<String>,
    pub site_name: String,
    pub project_name: String,
    pub tape_name: String,
    pub generator_name: String,
    /// Fixed-point scale: stored sample = physical value * scale
    pub scale_factor: i16,
    pub missing_data_value: i16,
    /// File generation date; `None` stamps the current UTC date
    pub generation_date: Option<NaiveDate>,
}

impl Default for UfConfig {
    fn default() -> Self {
        Self {
            volume_number: 1,
            radar_name: None,
            site_name: "UNKNOWN".to_string(),
            project_name: "RADBRIDG".to_string(),
            tape_name: String::new(),
            generator_name: "RADBRIDG".to_string(),
            scale_factor: 100,
            missing_data_value: -32768,
            generation_date: None,
        }
    }
}

/// Total 16-bit words in one ray record
pub fn record_words(field_count: usize, gate_count: usize) -> usize {
    MANDATORY_WORDS
        + OPTIONAL_WORDS
        + DATA_HEADER_WORDS
        + field_count * (DIRECTORY_WORDS_PER_FIELD + FIELD_HEADER_WORDS + gate_count)
}

/// 1-based word position of field `idx`'s header within the record
pub fn field_header_position(field_count: usize, gate_count: usize, idx: usize) -> usize {
    MANDATORY_WORDS
        + OPTIONAL_WORDS
        + DATA_HEADER_WORDS
        + DIRECTORY_WORDS_PER_FIELD * field_count
        + (FIELD_HEADER_WORDS + gate_count) * idx
        + 1
}

fn check_addressing(field_count: usize, gate_count: usize) -> VolumeResult<()> {
    let words = record_words(field_count, gate_count);
    if words > i16::MAX as usize {
        return Err(VolumeError::FieldCountOverflow(format!(
            "{} fields of {} gates need {} words, limit {}",
            field_count,
            gate_count,
            words,
            i16::MAX
        )));
    }
    Ok(())
}

/// Big-endian record assembly buffer
struct RecordBuf {
    buf: Vec<u8>,
}

impl RecordBuf {
    fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// ASCII text truncated or space-padded to exactly `len` bytes
    fn put_chars(&mut self, text: &str, len: usize) {
        let mut bytes: Vec<u8> = text
            .bytes()
            .take(len)
            .map(|b| if b.is_ascii() { b } else { b'?' })
            .collect();
        bytes.resize(len, b' ');
        self.buf.extend_from_slice(&bytes);
    }
}

/// Degrees to (degrees, minutes, seconds) header words.
///
/// Rounded seconds carry into minutes and degrees, so a coordinate a hair
/// below a whole degree never yields a 60-second word.
fn degrees_to_dms(value: f64) -> (i16, i16, i16) {
    let sign = if value < 0.0 { -1.0 } else { 1.0 };
    let abs = value.abs();
    let mut d = abs.trunc();
    let minutes = (abs - d) * 60.0;
    let mut m = minutes.trunc();
    let mut s = ((minutes - m) * 60.0).round();
    if s >= 60.0 {
        s -= 60.0;
        m += 1.0;
    }
    if m >= 60.0 {
        m -= 60.0;
        d += 1.0;
    }
    ((sign * d) as i16, (sign * m) as i16, (sign * s) as i16)
}

/// Angle in degrees to the 1/64-degree header word
fn angle_word(degrees: f64) -> i16 {
    (degrees * 64.0)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Two-letter directory tag from a field name
fn field_tag(name: &str) -> String {
    let mut tag: String = name.chars().take(2).collect::<String>().to_uppercase();
    while tag.len() < 2 {
        tag.push(' ');
    }
    tag
}

/// Build one framed ray record.
///
/// Records depend only on the ray's own data and the global field/gate
/// counts, so they may be produced in any order.
pub fn encode_record(model: &VolumeModel, ray: usize, config: &UfConfig) -> VolumeResult<Vec<u8>> {
    let field_count = model.fields().len();
    let gate_count = model.gate_count();
    check_addressing(field_count, gate_count)?;
    let words = record_words(field_count, gate_count);
    let record_bytes = 2 * words as u32;

    let sweep = model.sweep_for_ray(ray).ok_or_else(|| {
        VolumeError::IndexRange(format!(
            "ray {} outside volume of {} rays",
            ray,
            model.ray_count()
        ))
    })?;

    let mut rec = RecordBuf::with_capacity(8 + record_bytes as usize);
    rec.put_u32(record_bytes);
    write_mandatory_header(&mut rec, model, ray, sweep, words, config);
    write_optional_header(&mut rec, model, config);
    write_data_header(&mut rec, model, field_count, gate_count);
    for (idx, (name, field)) in model.fields().iter().enumerate() {
        write_field_header(&mut rec, model, field_count, gate_count, idx, config);
        for gate in 0..gate_count {
            let value = field.data[[ray, gate]];
            if field.is_missing(value) {
                rec.put_i16(config.missing_data_value);
            } else {
                let scaled = (value as f64 * config.scale_factor as f64)
                    .round()
                    .clamp(-32767.0, 32767.0);
                rec.put_i16(scaled as i16);
            }
        }
        log::trace!("ray {}: encoded field '{}'", ray, name);
    }
    rec.put_u32(record_bytes);

    Ok(rec.buf)
}

fn write_mandatory_header(
    rec: &mut RecordBuf,
    model: &VolumeModel,
    ray: usize,
    sweep: usize,
    words: usize,
    config: &UfConfig,
) {
    let radar_name = config
        .radar_name
        .clone()
        .or_else(|| {
            model
                .metadata()
                .get("instrument")
                .or_else(|| model.metadata().get("source"))
                .and_then(|v| v.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let ray_time = model.epoch()
        + Duration::milliseconds((model.time()[ray] * 1000.0).round() as i64);
    let generated = config
        .generation_date
        .unwrap_or_else(|| Utc::now().date_naive());

    let (lat_d, lat_m, lat_s) = degrees_to_dms(model.latitude());
    let (lon_d, lon_m, lon_s) = degrees_to_dms(model.longitude());

    rec.put_chars("UF", 2);
    rec.put_i16(words as i16);
    rec.put_i16((MANDATORY_WORDS + 1) as i16); // optional header position
    rec.put_i16((MANDATORY_WORDS + OPTIONAL_WORDS + 1) as i16); // local use header position
    rec.put_i16((MANDATORY_WORDS + OPTIONAL_WORDS + 1) as i16); // data header position
    rec.put_i16((ray + 1) as i16); // record number, one record per ray
    rec.put_i16(config.volume_number);
    rec.put_i16((ray + 1) as i16);
    rec.put_i16(1); // record in ray
    rec.put_i16((sweep + 1) as i16);
    rec.put_chars(&radar_name, 8);
    rec.put_chars(&config.site_name, 8);
    rec.put_i16(lat_d);
    rec.put_i16(lat_m);
    rec.put_i16(lat_s);
    rec.put_i16(lon_d);
    rec.put_i16(lon_m);
    rec.put_i16(lon_s);
    rec.put_i16(model.altitude_m().round() as i16);
    rec.put_i16((ray_time.year() % 100) as i16);
    rec.put_i16(ray_time.month() as i16);
    rec.put_i16(ray_time.day() as i16);
    rec.put_i16(ray_time.hour() as i16);
    rec.put_i16(ray_time.minute() as i16);
    rec.put_i16(ray_time.second() as i16);
    rec.put_chars("UT", 2);
    rec.put_i16(angle_word(model.azimuth()[ray]));
    rec.put_i16(angle_word(model.elevation()[ray]));
    rec.put_i16(1); // sweep mode: PPI
    rec.put_i16(angle_word(model.fixed_angle()[sweep]));
    rec.put_i16(config.missing_data_value); // sweep rate unknown
    rec.put_i16((generated.year() % 100) as i16);
    rec.put_i16(generated.month() as i16);
    rec.put_i16(generated.day() as i16);
    rec.put_chars(&config.generator_name, 8);
    rec.put_i16(config.missing_data_value);
}

fn write_optional_header(rec: &mut RecordBuf, model: &VolumeModel, config: &UfConfig) {
    let epoch = model.epoch();
    rec.put_chars(&config.project_name, 8);
    rec.put_i16(config.missing_data_value); // baseline azimuth
    rec.put_i16(config.missing_data_value); // baseline elevation
    rec.put_i16(epoch.hour() as i16);
    rec.put_i16(epoch.minute() as i16);
    rec.put_i16(epoch.second() as i16);
    rec.put_chars(&config.tape_name, 8);
    rec.put_i16(0);
}

fn write_data_header(
    rec: &mut RecordBuf,
    model: &VolumeModel,
    field_count: usize,
    gate_count: usize,
) {
    rec.put_i16(field_count as i16);
    rec.put_i16(1); // records this ray
    rec.put_i16(field_count as i16);
    for (idx, name) in model.fields().keys().enumerate() {
        rec.put_chars(&field_tag(name), 2);
        rec.put_i16(field_header_position(field_count, gate_count, idx) as i16);
    }
}

fn write_field_header(
    rec: &mut RecordBuf,
    model: &VolumeModel,
    field_count: usize,
    gate_count: usize,
    idx: usize,
    config: &UfConfig,
) {
    let header_pos = field_header_position(field_count, gate_count, idx);
    let start_km = (model.range_start_offset() / 1000.0).trunc();
    let start_m = model.range_start_offset() - start_km * 1000.0;

    rec.put_i16((header_pos + FIELD_HEADER_WORDS) as i16); // data position
    rec.put_i16(config.scale_factor);
    rec.put_i16(start_km as i16);
    rec.put_i16(start_m.round() as i16);
    rec.put_i16(model.range_gate_spacing().round() as i16);
    rec.put_i16(gate_count as i16);
    rec.put_i16(config.missing_data_value); // pulse width unknown
    rec.put_i16(config.missing_data_value); // horizontal beam width unknown
    rec.put_i16(config.missing_data_value); // vertical beam width unknown
    rec.put_i16(config.missing_data_value); // receiver bandwidth unknown
    rec.put_i16(0); // polarization: horizontal
    rec.put_i16(config.missing_data_value); // wavelength unknown
    rec.put_i16(config.missing_data_value); // sample size unknown
    rec.put_chars("NC", 2); // no threshold field
    rec.put_i16(config.missing_data_value);
    rec.put_i16(0);
    rec.put_chars("UF", 2); // edit code
    rec.put_i16(config.missing_data_value); // PRT unknown
    rec.put_i16(16); // bits per bin
    rec.put_chars("", 12); // reserved
}

/// Serialize every ray of the volume to the sink, in ray order.
pub fn write_volume<W: Write>(
    model: &VolumeModel,
    sink: &mut W,
    config: &UfConfig,
) -> VolumeResult<()> {
    log::info!(
        "writing {} rays x {} fields x {} gates",
        model.ray_count(),
        model.fields().len(),
        model.gate_count()
    );
    check_addressing(model.fields().len(), model.gate_count())?;
    for ray in 0..model.ray_count() {
        let record = encode_record(model, ray, config)?;
        sink.write_all(&record)?;
    }
    log::info!("wrote {} records", model.ray_count());
    Ok(())
}

/// Parallel variant of [`write_volume`]: records are produced concurrently
/// and written in ray order.
#[cfg(feature = "parallel")]
pub fn write_volume_parallel<W: Write>(
    model: &VolumeModel,
    sink: &mut W,
    config: &UfConfig,
) -> VolumeResult<()> {
    use rayon::prelude::*;

    check_addressing(model.fields().len(), model.gate_count())?;
    let records: Vec<Vec<u8>> = (0..model.ray_count())
        .into_par_iter()
        .map(|ray| encode_record(model, ray, config))
        .collect::<VolumeResult<_>>()?;
    for record in records {
        sink.write_all(&record)?;
    }
    Ok(())
}
