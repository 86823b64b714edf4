use anyhow::{bail, Context, Result};
use ndvi_dashboard::catalog::cache::CachedCatalog;
use ndvi_dashboard::catalog::json_catalog::JsonCatalog;
use ndvi_dashboard::catalog::selection::SelectionRequest;
use ndvi_dashboard::chart::LineChartRenderer;
use ndvi_dashboard::cli::{Args, Command, OutputFormat, SourceArgs};
use ndvi_dashboard::pipeline::extract::{FileIndexExtractor, HttpIndexExtractor, IndexExtractor};
use ndvi_dashboard::web::api::{series_for, AppState};
use ndvi_dashboard::web::server::run_server;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    let catalog = JsonCatalog::load(&args.sources.catalog)
        .with_context(|| format!("Failed to load catalog at: {:?}", args.sources.catalog))?;
    let catalog = CachedCatalog::new(catalog, args.sources.cache_policy());

    let state = Arc::new(AppState {
        catalog: Arc::new(catalog),
        extractor: build_extractor(&args.sources)?,
        config: args.pipeline.config(),
        fallback: args.pipeline.fallback,
        renderer: LineChartRenderer::default(),
    });

    match args.command {
        Command::Serve { host, port } => run_server(host, port, state).await?,
        Command::Series {
            selection,
            output,
            format,
        } => write_series(state, selection.into(), output, format).await?,
    }

    Ok(())
}

fn build_extractor(sources: &SourceArgs) -> Result<Arc<dyn IndexExtractor>> {
    if let Some(url) = &sources.index_url {
        info!("Using index service at {}", url);
        let extractor = HttpIndexExtractor::new(
            url,
            sources.window(),
            sources.index_timeout(),
            tokio::runtime::Handle::current(),
        )?;
        return Ok(Arc::new(extractor));
    }
    if let Some(path) = &sources.index_samples {
        info!("Using precomputed index samples from {:?}", path);
        return Ok(Arc::new(FileIndexExtractor::load(path)?));
    }
    bail!("Either --index-url or --index-samples is required")
}

async fn write_series(
    state: Arc<AppState>,
    request: SelectionRequest,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let run = tokio::task::spawn_blocking(move || series_for(&state, &request))
        .await
        .context("Pipeline task panicked")??;

    info!(
        "Selection {}: {} field(s), {} date(s)",
        run.selection,
        run.report.interpolated.fields.len(),
        run.report.interpolated.dates.len()
    );

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &run)?;
            writeln!(writer)?;
        }
        OutputFormat::Csv => run.report.observed.write_csv(&mut writer)?,
    }
    writer.flush()?;

    Ok(())
}
