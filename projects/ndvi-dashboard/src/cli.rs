use crate::catalog::cache::CachePolicy;
use crate::catalog::selection::{FallbackPolicy, SelectionRequest};
use crate::pipeline::extract::DateWindow;
use crate::pipeline::geometry::FieldNameKey;
use crate::pipeline::interpolate::InsufficientDataPolicy;
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::reshape::DuplicatePolicy;
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the dashboard JSON API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Port to bind to
        #[arg(long, default_value_t = 12206)]
        port: u16,
    },
    /// Run the pipeline once for a selection and write the result
    Series {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Full run report with chart
    Json,
    /// Observed wide table only
    Csv,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SourceArgs {
    /// Catalog snapshot (users, seasons, farms, fields)
    #[arg(long, env = "NDVI_DASHBOARD_CATALOG")]
    pub catalog: PathBuf,

    /// Index service endpoint
    #[arg(long, env = "NDVI_DASHBOARD_INDEX_URL", conflicts_with = "index_samples")]
    pub index_url: Option<String>,

    /// Precomputed observations keyed by field name
    #[arg(long, env = "NDVI_DASHBOARD_INDEX_SAMPLES")]
    pub index_samples: Option<PathBuf>,

    /// First date requested from the index service (YYYY-MM-DD)
    #[arg(long, env = "NDVI_DASHBOARD_INDEX_START")]
    pub index_start: Option<NaiveDate>,

    /// Last date requested from the index service (YYYY-MM-DD)
    #[arg(long, env = "NDVI_DASHBOARD_INDEX_END")]
    pub index_end: Option<NaiveDate>,

    #[arg(long, env = "NDVI_DASHBOARD_INDEX_TIMEOUT_SECS", default_value_t = 60)]
    pub index_timeout_secs: u64,

    /// Maximum cached metadata responses per query kind
    #[arg(long, env = "NDVI_DASHBOARD_CACHE_CAPACITY", default_value_t = 256)]
    pub cache_capacity: usize,

    #[arg(long, env = "NDVI_DASHBOARD_CACHE_TTL_SECS", default_value_t = 600)]
    pub cache_ttl_secs: u64,
}

impl SourceArgs {
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            capacity: self.cache_capacity,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.index_start,
            end: self.index_end,
        }
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PipelineArgs {
    /// Concurrent index extractions
    #[arg(long, env = "NDVI_DASHBOARD_EXTRACT_WORKERS", default_value_t = 1)]
    pub extract_workers: usize,

    /// What to do with a field that has fewer than two observations
    #[arg(long, value_enum, default_value_t = InsufficientDataPolicy::Drop)]
    pub insufficient_data: InsufficientDataPolicy,

    /// What to do with two observations for the same (date, field)
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Average)]
    pub duplicates: DuplicatePolicy,

    /// Attribute that groups field records into one field
    #[arg(long, value_enum, default_value_t = FieldNameKey::Name)]
    pub field_key: FieldNameKey,

    /// How to fill a level whose requested id is unknown
    #[arg(long, value_enum, default_value_t = FallbackPolicy::First)]
    pub fallback: FallbackPolicy,
}

impl PipelineArgs {
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            field_key: self.field_key,
            duplicates: self.duplicates,
            insufficient_data: self.insufficient_data,
            extract_workers: self.extract_workers.max(1),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SelectionArgs {
    #[arg(long, env = "NDVI_DASHBOARD_EMAIL")]
    pub email: String,

    #[arg(long)]
    pub domain_id: Option<u64>,

    /// 0 selects all areas
    #[arg(long)]
    pub area_id: Option<u64>,

    #[arg(long)]
    pub workspace_id: Option<u64>,

    #[arg(long)]
    pub season_id: Option<u64>,

    #[arg(long)]
    pub farm_id: Option<u64>,
}

impl From<SelectionArgs> for SelectionRequest {
    fn from(args: SelectionArgs) -> Self {
        Self {
            email: args.email,
            domain_id: args.domain_id,
            area_id: args.area_id,
            workspace_id: args.workspace_id,
            season_id: args.season_id,
            farm_id: args.farm_id,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
