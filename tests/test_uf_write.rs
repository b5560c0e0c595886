use chrono::NaiveDate;
use ndarray::Array2;
use radbridge::io::uf::{field_header_position, record_words};
use radbridge::io::{decode_volume, write_volume, MemoryContainer, UfConfig};
use radbridge::FieldTable;
use std::fs;
use std::io::Write;

fn build_test_container() -> MemoryContainer {
    let mut c = MemoryContainer::new();
    c.set_attr("what", "object", "PVOL");
    c.set_attr("what", "source", "WMO:12345");
    c.set_attr("where", "lat", 44.5);
    c.set_attr("where", "lon", 20.25);
    c.set_attr("where", "height", 120.0);

    for (i, (elangle, start, end)) in [
        (0.5, ("20200101", "000000"), ("20200101", "000010")),
        (1.5, ("20200101", "000020"), ("20200101", "000030")),
    ]
    .iter()
    .enumerate()
    {
        let ds = format!("dataset{}", i + 1);
        let where_path = format!("{}/where", ds);
        c.set_attr(&where_path, "nrays", 3i64);
        c.set_attr(&where_path, "elangle", *elangle);
        c.set_attr(&where_path, "a1gate", 0i64);
        c.set_attr(&where_path, "rstart", 1.0); // km
        c.set_attr(&where_path, "rscale", 250.0);
        c.set_attr(&where_path, "nbins", 5i64);

        let what_path = format!("{}/what", ds);
        c.set_attr(&what_path, "startdate", start.0);
        c.set_attr(&what_path, "starttime", start.1);
        c.set_attr(&what_path, "enddate", end.0);
        c.set_attr(&what_path, "endtime", end.1);

        let mut raw = Array2::from_elem((3, 5), 100.0);
        raw[[0, 0]] = 255.0; // nodata
        let dbzh = format!("{}/data1", ds);
        c.set_data(&dbzh, raw);
        let dbzh_what = format!("{}/what", dbzh);
        c.set_attr(&dbzh_what, "quantity", "DBZH");
        c.set_attr(&dbzh_what, "nodata", 255.0);
        c.set_attr(&dbzh_what, "gain", 0.5);
        c.set_attr(&dbzh_what, "offset", -32.0);
    }
    c
}

fn test_config() -> UfConfig {
    UfConfig {
        generation_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        ..Default::default()
    }
}

fn word_at(record: &[u8], idx: usize) -> i16 {
    i16::from_be_bytes(record[4 + 2 * idx..6 + 2 * idx].try_into().unwrap())
}

#[test]
fn test_written_file_traverses_forward_and_backward() {
    let _ = env_logger::builder().is_test(true).try_init();
    let model = decode_volume(&build_test_container(), &FieldTable::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.uf");
    let mut file = fs::File::create(&path).unwrap();
    write_volume(&model, &mut file, &test_config()).unwrap();
    file.flush().unwrap();

    let bytes = fs::read(&path).unwrap();
    let frame_bytes = 2 * record_words(1, 5);
    assert_eq!(bytes.len(), 6 * (frame_bytes + 8));

    // forward: leading length word of every record
    let mut offset = 0;
    let mut records = 0;
    while offset < bytes.len() {
        let lead = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        assert_eq!(lead, frame_bytes);
        offset += 4 + lead + 4;
        records += 1;
    }
    assert_eq!(records, 6);

    // backward: trailing length word of every record
    let mut end = bytes.len();
    while end > 0 {
        let trail = u32::from_be_bytes(bytes[end - 4..end].try_into().unwrap()) as usize;
        assert_eq!(trail, frame_bytes);
        end -= 4 + trail + 4;
    }
    assert_eq!(end, 0);
}

#[test]
fn test_ray_and_sweep_numbering() {
    let model = decode_volume(&build_test_container(), &FieldTable::default()).unwrap();
    let mut sink = Vec::new();
    write_volume(&model, &mut sink, &test_config()).unwrap();

    let record_len = 8 + 2 * record_words(1, 5);
    for ray in 0..6 {
        let record = &sink[ray * record_len..(ray + 1) * record_len];
        assert_eq!(&record[4..6], b"UF");
        assert_eq!(word_at(record, 7), (ray + 1) as i16); // ray number
        assert_eq!(word_at(record, 9), if ray < 3 { 1 } else { 2 }); // sweep
    }
}

#[test]
fn test_field_data_round_trips_through_scaling() {
    let model = decode_volume(&build_test_container(), &FieldTable::default()).unwrap();
    let config = test_config();
    let mut sink = Vec::new();
    write_volume(&model, &mut sink, &config).unwrap();

    let record_len = 8 + 2 * record_words(1, 5);
    let record = &sink[0..record_len];

    // directory names the reflectivity header where the formula says
    let dir_word = 62;
    assert_eq!(&record[4 + 2 * dir_word..6 + 2 * dir_word], b"RE");
    let header_pos = word_at(record, dir_word + 1) as usize;
    assert_eq!(header_pos, field_header_position(1, 5, 0));

    // bin geometry: start range 1 km, 250 m spacing, 5 bins
    let fh = header_pos - 1;
    assert_eq!(word_at(record, fh + 2), 1);
    assert_eq!(word_at(record, fh + 4), 250);
    assert_eq!(word_at(record, fh + 5), 5);

    // gate 0 of ray 0 was the nodata sentinel, the rest decode to 18 dBZ
    let data0 = fh + 25;
    assert_eq!(word_at(record, data0), config.missing_data_value);
    for gate in 1..5 {
        let stored = word_at(record, data0 + gate);
        let physical = stored as f64 / config.scale_factor as f64;
        assert!((physical - 18.0).abs() < 1e-9);
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_write_matches_sequential() {
    use radbridge::io::write_volume_parallel;

    let model = decode_volume(&build_test_container(), &FieldTable::default()).unwrap();
    let config = test_config();
    let mut sequential = Vec::new();
    write_volume(&model, &mut sequential, &config).unwrap();
    let mut parallel = Vec::new();
    write_volume_parallel(&model, &mut parallel, &config).unwrap();
    assert_eq!(sequential, parallel);
}
