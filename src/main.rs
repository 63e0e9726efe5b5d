use chrono::NaiveDate;
use clap::Parser;
use color_eyre::eyre::WrapErr;
use s2_composite::pipeline::{DEFAULT_CLOUD_THRESHOLD, DEFAULT_COLLECTION, default_aoi};
use s2_composite::{CompositePipeline, Credentials, ImageryService, LocalCatalog, Polygon};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Median composite of cloud-masked Sentinel-2 scenes over an area of interest.
#[derive(Parser, Debug)]
#[command(name = "s2-composite", version, about)]
struct Cli {
    /// Directory holding the scene snapshot (`*.json` scene files).
    #[arg(long)]
    catalog: PathBuf,

    /// Project id used to authenticate against the catalog.
    #[arg(long)]
    project: String,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// First day of the period, YYYY-MM-DD.
    #[arg(long, default_value = "2019-05-01")]
    start: NaiveDate,

    /// Length of the period in calendar months.
    #[arg(long, default_value_t = 5)]
    months: u32,

    /// Scenes need CLOUDY_PIXEL_PERCENTAGE strictly below this.
    #[arg(long, default_value_t = DEFAULT_CLOUD_THRESHOLD)]
    cloud_threshold: f64,

    /// JSON file with the AOI as a list of `[lon, lat]` pairs.
    #[arg(long)]
    aoi: Option<PathBuf>,

    /// Where to write the map page.
    #[arg(long, default_value = "map.html")]
    out: PathBuf,

    /// Optional JSON summary of the run.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn load_aoi(path: Option<&PathBuf>) -> color_eyre::Result<Polygon> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("Failed to read AOI file {}", path.display()))?;
            serde_json::from_str(&text)
                .wrap_err_with(|| format!("Invalid AOI polygon in {}", path.display()))
        }
        None => Ok(default_aoi()?),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut catalog = LocalCatalog::from_dir(&cli.catalog)?;
    catalog.authenticate(&Credentials::new(cli.project.as_str()))?;

    let pipeline = CompositePipeline::builder()
        .aoi(load_aoi(cli.aoi.as_ref())?)
        .collection(cli.collection.as_str())
        .cloud_threshold(cli.cloud_threshold)
        .start(cli.start)
        .months(cli.months)
        .build()?;

    let report = pipeline.run(&catalog)?;
    println!("Filtered collection size: {}", report.filtered_count);

    report.map.write_html(&cli.out)?;
    if let Some(path) = &cli.report {
        std::fs::write(path, report.to_json()?)
            .wrap_err_with(|| format!("Failed to write report {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    Ok(())
}
