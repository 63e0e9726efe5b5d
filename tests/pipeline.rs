use chrono::NaiveDate;
use s2_composite::catalog::BandRecord;
use s2_composite::collection::QueryError;
use s2_composite::pipeline::{DEFAULT_CLOUD_PROPERTY, DEFAULT_COLLECTION, default_aoi};
use s2_composite::render::LayerSource;
use s2_composite::{
    CompositePipeline, Credentials, GeoTransform, ImageryService, LocalCatalog, S2CompositeError,
    SceneRecord,
};
use serde_json::{Map, json};
use std::path::Path;

const WIDTH: usize = 4;
const HEIGHT: usize = 4;

fn grid(origin_lon: f64) -> GeoTransform {
    GeoTransform {
        origin_lon,
        origin_lat: 52.14,
        pixel_width: 0.05,
        pixel_height: 0.025,
    }
}

/// A 4x4 scene. Pixel (0, 0) is always classified as cloud.
fn scene(
    collection: &str,
    date: NaiveDate,
    cloud: Option<f64>,
    origin_lon: f64,
    red: u16,
) -> SceneRecord {
    let id = format!(
        "{}_{}_T31UFU",
        date.format("%Y%m%dT105031"),
        date.format("%Y%m%dT105347")
    );
    let mut properties = Map::new();
    if let Some(cloud) = cloud {
        properties.insert(DEFAULT_CLOUD_PROPERTY.to_string(), json!(cloud));
    }
    let band = |name: &str, value: u16| BandRecord {
        name: name.to_string(),
        values: vec![value; WIDTH * HEIGHT],
    };
    let mut scl = vec![4u16; WIDTH * HEIGHT];
    scl[0] = 9;
    SceneRecord {
        id,
        collection: collection.to_string(),
        properties,
        footprint: None,
        transform: grid(origin_lon),
        width: WIDTH,
        height: HEIGHT,
        bands: vec![
            band("B2", 400),
            band("B3", 700),
            band("B4", red),
            band("B8", 3200),
            band("B11", 1500),
            BandRecord {
                name: "SCL".to_string(),
                values: scl,
            },
        ],
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Twenty scenes that pass every filter, plus decoys that each fail one.
fn write_snapshot(dir: &Path) {
    let mut records = Vec::new();
    for i in 0..20u32 {
        let day = date(2019, 5, 2) + chrono::Days::new(u64::from(i) * 7);
        records.push(scene(
            DEFAULT_COLLECTION,
            day,
            Some(f64::from(i) * 1.5),
            5.03,
            1000 + i as u16 * 10,
        ));
    }
    // before the period
    records.push(scene(DEFAULT_COLLECTION, date(2019, 4, 30), Some(5.0), 5.03, 9000));
    // the end of the period is exclusive
    records.push(scene(DEFAULT_COLLECTION, date(2019, 10, 1), Some(5.0), 5.03, 9000));
    // the threshold is strict
    records.push(scene(DEFAULT_COLLECTION, date(2019, 6, 15), Some(30.0), 5.03, 9000));
    records.push(scene(DEFAULT_COLLECTION, date(2019, 6, 16), Some(75.0), 5.03, 9000));
    // outside the AOI
    records.push(scene(DEFAULT_COLLECTION, date(2019, 6, 17), Some(5.0), 10.0, 9000));
    // no cloud cover property
    records.push(scene(DEFAULT_COLLECTION, date(2019, 6, 18), None, 5.03, 9000));
    // another collection
    records.push(scene("COPERNICUS/S2", date(2019, 6, 19), Some(5.0), 5.03, 9000));

    LocalCatalog::write_snapshot(dir, &records).unwrap();
}

fn catalog(dir: &Path) -> LocalCatalog {
    write_snapshot(dir);
    let mut catalog = LocalCatalog::from_dir(dir).unwrap();
    catalog
        .authenticate(&Credentials::new("reference-run"))
        .unwrap();
    catalog
}

fn pipeline() -> CompositePipeline {
    CompositePipeline::builder()
        .aoi(default_aoi().unwrap())
        .build()
        .unwrap()
}

#[test]
fn filtered_snapshot_has_twenty_scenes() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog(dir.path());
    assert_eq!(pipeline().filtered(&catalog).unwrap().size().unwrap(), 20);
}

#[test]
fn composite_is_median_of_clear_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog(dir.path());
    let composite = pipeline().composite(&catalog).unwrap();

    assert_eq!(composite.band_names(), vec!["B4", "B3", "B2", "B8"]);
    let red = composite.band("B4").unwrap();
    // values 1000..=1190 step 10, the middle two are 1090 and 1100
    approx::assert_relative_eq!(red.value(1, 1).unwrap(), 0.1095, epsilon = 1e-6);
    approx::assert_relative_eq!(
        composite.band("B8").unwrap().value(2, 2).unwrap(),
        0.32,
        epsilon = 1e-6
    );
}

#[test]
fn pixel_clouded_in_every_scene_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog(dir.path());
    let composite = pipeline().composite(&catalog).unwrap();

    for band in composite.bands() {
        assert!(!band.mask[[0, 0]], "{} should be no-data", band.name);
        assert!(band.data[[0, 0]].is_nan(), "{} must not be filled with 0", band.name);
        assert_eq!(band.value(0, 0), None);
    }
    // the bottom row lies south of the AOI and is clipped away
    assert_eq!(composite.band("B4").unwrap().value(3, 1), None);
}

#[test]
fn select_before_mask_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog(dir.path());
    let query = pipeline()
        .filtered(&catalog)
        .unwrap()
        .select(&["B4", "B3", "B2"])
        .mask_clouds();
    assert!(matches!(
        query.size(),
        Err(S2CompositeError::Query(QueryError::MaskAfterSelect { .. }))
    ));
}

#[test]
fn run_writes_map_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot");
    let catalog = catalog(&snapshot);
    let report = pipeline().run(&catalog).unwrap();
    assert_eq!(report.filtered_count, 20);

    let layer = &report.map.layers()[0];
    assert_eq!(layer.label, "RGB");
    match &layer.source {
        LayerSource::Raster { rgba, .. } => assert_eq!(rgba[3], 0),
        other => panic!("expected raster layer, got {other:?}"),
    }

    let out = dir.path().join("map.html");
    report.map.write_html(&out).unwrap();
    let html = std::fs::read_to_string(&out).unwrap();
    assert!(html.contains("L.imageOverlay"));

    let summary = report.summary();
    assert_eq!(summary.filtered_count, 20);
    assert_eq!(summary.bands[0].no_data_pixels, 5);
}

#[test]
fn fingerprint_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog(dir.path());
    let first = pipeline().prepared(&catalog).unwrap().describe().fingerprint().unwrap();
    let second = pipeline().prepared(&catalog).unwrap().describe().fingerprint().unwrap();
    assert_eq!(first, second);
}
