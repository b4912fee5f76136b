//! Impact framework advisor CLI
//!
//! Runs the right-sizing and carbon advisor plugins over JSON input records
//! and browses the built-in instance catalogs.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::carbon::{CarbonOptions, Emissions};
use commands::{carbon, catalog, rightsize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Impact framework advisor CLI
#[derive(Parser)]
#[command(name = "ifadvise")]
#[command(author, version, about = "Right-sizing and carbon-aware advice for impact framework records", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, short, global = true, env = "IFA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, default_value = "json")]
    pub log_format: output::LogFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Right-size cloud instances in a batch of records
    RightSize {
        /// Input records (JSON array, or `-` for stdin)
        #[arg(long, short)]
        input: PathBuf,

        /// Custom instance catalog, served as the `custom` vendor
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Default target CPU utilization percentage
        #[arg(long)]
        target_cpu_util: Option<f64>,
    },

    /// Find the best time and location to run a workload
    CarbonAdvise {
        /// Input records (JSON array, or `-` for stdin)
        #[arg(long, short)]
        input: PathBuf,

        /// Allowed location or location group (repeatable, comma separated)
        #[arg(long = "location", value_delimiter = ',')]
        locations: Vec<String>,

        /// Allowed timeframe, `START - END` in RFC 3339 (repeatable)
        #[arg(long = "timeframe")]
        timeframes: Vec<String>,

        /// Number of plotted points to return
        #[arg(long)]
        sampling: Option<usize>,

        /// Seed for reproducible plotted points
        #[arg(long)]
        seed: Option<u64>,

        /// Carbon-aware web API base URL
        #[arg(long, env = "IFA_API_URL")]
        api_url: Option<String>,

        /// Read emissions from a JSON file instead of the web API
        #[arg(long)]
        emissions_file: Option<PathBuf>,

        /// Evaluate forecasts as of this instant (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Browse instance catalogs
    #[command(subcommand)]
    Catalog(CatalogCommands),
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Show the instances of a vendor
    Show {
        /// Vendor: aws, azure or custom
        #[arg(long)]
        vendor: String,

        /// Only show this family
        #[arg(long)]
        family: Option<String>,

        /// Show prices for this region
        #[arg(long)]
        region: Option<String>,

        /// Catalog file for the `custom` vendor
        #[arg(long)]
        data_path: Option<PathBuf>,
    },

    /// Summarize the catalogs of every known vendor
    Vendors {
        /// Catalog file for the `custom` vendor
        #[arg(long)]
        data_path: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, format: output::LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        output::LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        output::LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}

fn print_metrics() -> Result<()> {
    let encoder = prometheus::TextEncoder::new();
    let text = encoder
        .encode_to_string(&prometheus::gather())
        .context("Failed to encode metrics")?;
    eprint!("{}", text);
    Ok(())
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::RightSize { .. } => "right-size",
            Commands::CarbonAdvise { .. } => "carbon-advise",
            Commands::Catalog(CatalogCommands::Show { .. }) => "catalog show",
            Commands::Catalog(CatalogCommands::Vendors { .. }) => "catalog vendors",
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let settings = config::CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::RightSize {
            input,
            data_path,
            target_cpu_util,
        } => {
            let mut config = settings.right_sizing.to_plugin_config();
            if data_path.is_some() {
                config.data_path = data_path;
            }
            if target_cpu_util.is_some() {
                config.target_cpu_util = target_cpu_util;
            }
            rightsize::run(config, &input, cli.format).await?;
        }
        Commands::CarbonAdvise {
            input,
            locations,
            timeframes,
            sampling,
            seed,
            api_url,
            emissions_file,
            now,
        } => {
            let section = settings.carbon_advisor;
            let mut params = section.to_params();
            if !locations.is_empty() {
                params.allowed_locations = Some(locations);
            }
            if !timeframes.is_empty() {
                params.allowed_timeframes = Some(timeframes);
            }
            params.sampling = sampling.or(params.sampling);
            params.seed = seed.or(params.seed);
            params.api_url = api_url.or(params.api_url);

            let emissions = match emissions_file.or(section.emissions_file) {
                Some(path) => Emissions::File(path),
                None => Emissions::Api,
            };
            let options = CarbonOptions {
                params,
                emissions,
                now,
            };
            carbon::run(options, &input, cli.format).await?;
        }
        Commands::Catalog(CatalogCommands::Show {
            vendor,
            family,
            region,
            data_path,
        }) => {
            let data_path = data_path.or(settings.right_sizing.data_path);
            catalog::show(
                &vendor,
                family.as_deref(),
                region.as_deref(),
                data_path,
                cli.format,
            )
            .await?;
        }
        Commands::Catalog(CatalogCommands::Vendors { data_path }) => {
            let data_path = data_path.or(settings.right_sizing.data_path);
            catalog::vendors(data_path, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);
    let show_metrics = cli.print_metrics;
    let command = cli.command.name();

    info!(command, "Running command");
    let started = Instant::now();
    let result = execute(cli).await;
    info!(
        command,
        success = result.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Command finished"
    );

    if show_metrics {
        if let Err(e) = print_metrics() {
            output::print_error(&format!("{:#}", e));
        }
    }
    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
