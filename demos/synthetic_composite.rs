use ndarray::Array2;
use s2_composite::pipeline::{DEFAULT_CLOUD_PROPERTY, DEFAULT_COLLECTION, default_aoi};
use s2_composite::raster::TIME_START;
use s2_composite::{
    Band, CompositePipeline, Credentials, GeoTransform, Image, ImageryService, LocalCatalog,
    Polygon,
};
use serde_json::{Map, json};

/// A field of gently varying reflectance with a moving cloud.
fn synthetic_scene(index: usize, aoi: &Polygon) -> color_eyre::Result<Image> {
    let bounds = aoi.bounds();
    let (height, width) = (80, 120);
    let transform = GeoTransform {
        origin_lon: bounds.west,
        origin_lat: bounds.north,
        pixel_width: bounds.width() / width as f64,
        pixel_height: bounds.height() / height as f64,
    };
    let footprint = Polygon::from_bounds(transform.bounds(height, width))?;

    let field = |base: f32| {
        Array2::from_shape_fn((height, width), |(r, c)| {
            base + 300.0 * ((r as f32 / 9.0).sin() + (c as f32 / 13.0).cos())
        })
    };
    let cloud_col = index * 12;
    let scl = Array2::from_shape_fn((height, width), |(_, c)| {
        if c.abs_diff(cloud_col) < 10 { 9.0 } else { 4.0 }
    });

    let mut properties = Map::new();
    properties.insert(TIME_START.into(), json!(1_557_000_000_000_i64 + index as i64 * 432_000_000));
    properties.insert(DEFAULT_CLOUD_PROPERTY.into(), json!(5.0 + index as f64 * 2.0));

    Ok(Image::new(
        vec![
            Band::new("B2", field(600.0)),
            Band::new("B3", field(900.0)),
            Band::new("B4", field(1100.0)),
            Band::new("B8", field(2800.0)),
            Band::new("SCL", scl),
        ],
        transform,
        footprint,
        properties,
    )?)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let aoi = default_aoi()?;
    let mut catalog = LocalCatalog::new();
    for index in 0..10 {
        catalog.insert(DEFAULT_COLLECTION, synthetic_scene(index, &aoi)?);
    }
    catalog.authenticate(&Credentials::new("demo"))?;

    let pipeline = CompositePipeline::builder().aoi(aoi).build()?;
    let report = pipeline.run(&catalog)?;
    println!("Filtered collection size: {}", report.filtered_count);
    println!("{}", report.to_json()?);

    let path = std::env::temp_dir().join("s2_composite_demo.html");
    report.map.write_html(&path)?;
    opener::open(&path)?;

    Ok(())
}
