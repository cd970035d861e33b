use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import modules from the library crate
use cratekeeper::acquisition::{AcquisitionBackend, InteractiveToolBackend};
use cratekeeper::catalog::{CatalogClient, SpotifyClient};
use cratekeeper::config;
use cratekeeper::ledger::{DownloadPlatform, LedgerStore, SqliteLedgerStore};
use cratekeeper::orchestrator::Orchestrator;
use cratekeeper::progress::ProgressTracker;
use cratekeeper::server::{self, ServerState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Root of the genre-organized music library.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub library_dir: Option<PathBuf>,

    /// Path to the ledger database. Defaults to <library_dir>/cratekeeper.db.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// The port to listen on (serve command).
    #[clap(short, long, default_value_t = 3002)]
    pub port: u16,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Sync all liked tracks from every configured catalog.
    Sync,
    /// Sync one playlist by its catalog id.
    Playlist { id: String },
    /// Acquire a single track by artist and title.
    Track {
        #[clap(long)]
        artist: String,
        #[clap(long)]
        title: String,
    },
    /// Re-examine tracks filed under Other and move the ones whose artists
    /// have gained genre data.
    Reclassify,
    /// Print ledger statistics.
    Stats,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            library_dir: args.library_dir.clone(),
            db_path: args.db_path.clone(),
            port: args.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  library_dir: {:?}", app_config.library_dir);
    info!("  db_path: {:?}", app_config.db_path);

    std::fs::create_dir_all(&app_config.library_dir)?;
    let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(&app_config.db_path)?);

    let spotify = Arc::new(SpotifyClient::new(app_config.spotify.clone()));
    if !spotify.is_configured() {
        info!("Spotify credentials not configured, catalog scans will be empty");
    }
    let catalogs: Vec<Arc<dyn CatalogClient>> = vec![spotify];

    // Beatport first, Tidal as fallback
    let backends: Vec<Arc<dyn AcquisitionBackend>> = vec![
        Arc::new(InteractiveToolBackend::new(
            DownloadPlatform::Beatport,
            app_config.beatport_tool.clone(),
            app_config.thresholds,
            app_config.session_timeout,
            app_config.settle_delay,
        )),
        Arc::new(InteractiveToolBackend::new(
            DownloadPlatform::Tidal,
            app_config.tidal_tool.clone(),
            app_config.thresholds,
            app_config.session_timeout,
            app_config.settle_delay,
        )),
    ];

    let shutdown_token = CancellationToken::new();
    let progress = ProgressTracker::new();
    let orchestrator = Arc::new(Orchestrator::new(
        catalogs,
        backends,
        ledger.clone(),
        progress.clone(),
        app_config.library_dir.clone(),
        app_config.track_delay,
        app_config.playlist_delay,
        shutdown_token.child_token(),
    ));

    match cli_args.command {
        Command::Serve => {
            let state = ServerState {
                orchestrator,
                ledger,
                progress,
            };
            info!("Ready to serve at port {}!", app_config.port);
            tokio::select! {
                result = server::run(app_config.port, state, shutdown_token.child_token()) => {
                    info!("HTTP server stopped: {:?}", result);
                    shutdown_token.cancel();
                    result
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    shutdown_token.cancel();
                    // Give in-flight work a moment to wind down
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                }
            }
        }
        Command::Sync => {
            let report = run_with_ctrl_c(shutdown_token, orchestrator.run_full_sync()).await?;
            info!(
                "Full sync: {} scanned, {} acquired, {} skipped, {} failed, {} reclassified",
                report.scanned, report.acquired, report.skipped, report.failed, report.reclassified
            );
            Ok(())
        }
        Command::Playlist { id } => {
            let report =
                run_with_ctrl_c(shutdown_token, orchestrator.run_playlist_sync(&id)).await?;
            info!(
                "Playlist sync: {} scanned, {} acquired, {} skipped, {} failed",
                report.scanned, report.acquired, report.skipped, report.failed
            );
            Ok(())
        }
        Command::Track { artist, title } => {
            let report =
                run_with_ctrl_c(shutdown_token, orchestrator.run_single_track(&artist, &title))
                    .await?;
            if report.acquired == 1 {
                info!("Acquired '{} - {}'", artist, title);
            } else if report.skipped == 1 {
                info!("'{} - {}' is already in the library", artist, title);
            } else {
                anyhow::bail!("Failed to acquire '{} - {}'", artist, title);
            }
            Ok(())
        }
        Command::Reclassify => {
            let report = run_with_ctrl_c(shutdown_token, orchestrator.run_reclassify()).await?;
            info!(
                "Reclassify: {} examined, {} moved, {} unchanged, {} failed",
                report.examined, report.moved, report.unchanged, report.failed
            );
            Ok(())
        }
        Command::Stats => {
            let stats = ledger.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

/// Run an operation to completion, cancelling it on Ctrl+C so the batch
/// stops at the next track boundary.
async fn run_with_ctrl_c<T>(
    shutdown_token: CancellationToken,
    operation: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::pin!(operation);
    tokio::select! {
        result = &mut operation => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, finishing current track then stopping");
            shutdown_token.cancel();
            operation.await
        }
    }
}
