use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use harvest_core::config::LogFormat;
use harvest_core::{
    load_config_or_default, validate_config, AcquisitionController, Config, CsvProgressIndex,
    DoajFeed, HttpTransport, NamingStrategy,
};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "harvest.toml";

/// Harvest Indonesian health-science PDFs from DOAJ until a target count is reached.
#[derive(Debug, Parser)]
#[command(name = "harvest", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of successful downloads to reach.
    #[arg(long)]
    target: Option<u64>,

    /// Maximum concurrent downloads.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Payload file naming.
    #[arg(long, value_enum)]
    naming: Option<NamingArg>,

    /// Progress index (CSV).
    #[arg(long)]
    index: Option<PathBuf>,

    /// Directory for downloaded PDFs.
    #[arg(long)]
    payload_dir: Option<PathBuf>,

    /// Directory for the discovery resume cursor.
    #[arg(long)]
    job_dir: Option<PathBuf>,

    /// Move an unreadable index aside instead of refusing to start.
    #[arg(long)]
    fresh: bool,

    /// Do not retry downloads that failed in earlier runs.
    #[arg(long)]
    no_retry_failed: bool,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    /// More verbose logging (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NamingArg {
    Hash,
    TitleSlug,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(target) = self.target {
            config.run.target = target;
        }
        if let Some(concurrency) = self.concurrency {
            config.fetch.concurrency = concurrency;
        }
        if let Some(naming) = self.naming {
            config.storage.naming = match (naming, config.storage.naming) {
                (NamingArg::Hash, _) => NamingStrategy::Hash,
                (NamingArg::TitleSlug, current @ NamingStrategy::TitleSlug { .. }) => current,
                (NamingArg::TitleSlug, NamingStrategy::Hash) => NamingStrategy::default(),
            };
        }
        if let Some(index) = &self.index {
            config.storage.index_path = index.clone();
        }
        if let Some(dir) = &self.payload_dir {
            config.storage.payload_dir = dir.clone();
        }
        if let Some(dir) = &self.job_dir {
            config.storage.job_dir = dir.clone();
        }
        if self.fresh {
            config.run.fresh = true;
        }
        if self.no_retry_failed {
            config.run.retry_failed = false;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        match self.verbose {
            0 => {}
            1 => config.logging.level = "debug".to_string(),
            _ => config.logging.level = "trace".to_string(),
        }
        if let Some(format) = self.log_format {
            config.logging.format = match format {
                LogFormatArg::Text => LogFormat::Text,
                LogFormatArg::Json => LogFormat::Json,
            };
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("harvest: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()));
    let mut config = load_config_or_default(config_path.as_deref())
        .with_context(|| match &config_path {
            Some(path) => format!("Failed to load config from {:?}", path),
            None => "Failed to load default config".to_string(),
        })?;
    cli.apply(&mut config);
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config);
    match &config_path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file, using defaults"),
    }

    let store = Arc::new(
        CsvProgressIndex::new(&config.storage.index_path, &config.storage.payload_dir)
            .with_fresh(config.run.fresh),
    );
    let transport =
        Arc::new(HttpTransport::new(&config.fetch).context("Failed to create HTTP client")?);
    let feed = Arc::new(
        DoajFeed::new(&config.discovery, &config.fetch.user_agent)
            .context("Failed to create DOAJ client")?,
    );
    let controller = AcquisitionController::new(config, feed, transport, store);
    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing in-flight downloads");
        cancel.cancel();
    });

    let summary = controller
        .run()
        .await
        .context("Acquisition run failed to start")?;
    if summary.exhausted() {
        warn!(
            succeeded = summary.succeeded,
            target = summary.target,
            "Source exhausted below target"
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to encode run summary")?
    );
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper_util=info", config.logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
