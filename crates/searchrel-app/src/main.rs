//! Searchrel - search term relevance classification service.
//!
//! Provisions the NLI checkpoint, loads it once, and serves `POST /classify`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use searchrel_core::classifier::NliClassifier;
use searchrel_core::model_store::{ModelStore, ProgressCallback, DEFAULT_CHECKPOINT};
use searchrel_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Searchrel - zero-shot relevance classification for search terms
#[derive(Parser, Debug)]
#[command(name = "searchrel", version, about)]
struct Args {
    /// Host to bind the API server to
    #[arg(long, env = "SEARCHREL_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind the API server to
    #[arg(long, env = "SEARCHREL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Data directory holding models/ and lib/ (default: platform data dir)
    #[arg(long, env = "SEARCHREL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Hugging Face checkpoint (owner/repo) with an ONNX export
    #[arg(long, env = "SEARCHREL_CHECKPOINT", default_value = DEFAULT_CHECKPOINT)]
    checkpoint: String,

    /// Download the checkpoint and ONNX Runtime if missing
    #[arg(long)]
    download: bool,

    /// Maximum tokens per premise/hypothesis pair
    #[arg(long, default_value_t = 512)]
    max_length: usize,

    /// Per-request classification timeout in seconds
    #[arg(long, env = "SEARCHREL_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily-rotated logs to this directory
    #[arg(long, env = "SEARCHREL_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

/// Initialize logging, with an optional rolling log file.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "searchrel={0},searchrel_core={0},searchrel_server={0},warn",
            log_level
        ))
    });

    if let Some(ref log_dir) = args.log_dir {
        let file_appender = std::fs::create_dir_all(log_dir).ok().and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("searchrel")
                .filename_suffix("log")
                .build(log_dir)
                .ok()
        });

        if let Some(appender) = file_appender {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            tracing::info!("Logging to {:?}", log_dir);
            return Some(guard);
        }

        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        tracing::warn!("File logging unavailable in {:?}, using console only", log_dir);
        return None;
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    None
}

/// Fail fast when the binary was built without inference support.
fn ensure_ml_enabled() -> anyhow::Result<()> {
    if !cfg!(feature = "ml") {
        bail!("searchrel was built without the `ml` feature; rebuild with `--features ml`");
    }
    Ok(())
}

/// Resolve the model store from CLI arguments.
fn model_store(args: &Args) -> anyhow::Result<ModelStore> {
    let store = match args.data_dir {
        Some(ref dir) => ModelStore::with_data_dir(dir),
        None => ModelStore::new().context("could not determine a data directory")?,
    };
    Ok(store.with_checkpoint(&args.checkpoint))
}

/// Make sure the checkpoint and runtime are on disk.
async fn provision(store: &ModelStore, download: bool) -> anyhow::Result<()> {
    if download {
        let progress: ProgressCallback = Arc::new(|p| {
            if p.complete {
                tracing::info!("{}", p.step);
            } else {
                tracing::debug!(
                    downloaded = p.downloaded,
                    percent = ?p.percentage(),
                    "{}",
                    p.step
                );
            }
        });

        store
            .ensure_runtime(Some(progress.clone()))
            .await
            .context("failed to provision ONNX Runtime")?;
        store
            .ensure_checkpoint(Some(progress))
            .await
            .with_context(|| format!("failed to download checkpoint {}", store.checkpoint()))?;
    } else if !store.is_checkpoint_installed() {
        let missing: Vec<_> = store
            .missing_files()
            .into_iter()
            .map(|(_, path)| path.display().to_string())
            .collect();
        bail!(
            "checkpoint {} is not installed (missing: {}); rerun with --download",
            store.checkpoint(),
            missing.join(", ")
        );
    }

    if !store.setup_environment() {
        tracing::warn!(
            "ONNX Runtime not found in {:?}; relying on the system library",
            store.lib_dir()
        );
    }

    Ok(())
}

fn server_config(args: &Args) -> ServerConfig {
    ServerConfig::default()
        .with_host(&args.host)
        .with_port(args.port)
        .with_classify_timeout(args.timeout_secs.map(Duration::from_secs))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    tracing::info!("Searchrel v{} starting", env!("CARGO_PKG_VERSION"));

    ensure_ml_enabled()?;
    let store = model_store(&args)?;
    provision(&store, args.download).await?;

    let nli_config = store.nli_config().with_max_length(args.max_length);
    tracing::info!("Loading checkpoint {} from {:?}", store.checkpoint(), store.checkpoint_dir());
    let classifier = tokio::task::spawn_blocking(move || NliClassifier::new(nli_config))
        .await
        .context("model loading task panicked")?
        .context("failed to load classifier")?;

    let server = Server::with_state(server_config(&args), AppState::new(Arc::new(classifier)))
        .context("failed to configure API server")?;
    server.run().await.context("API server error")?;

    Ok(())
}
