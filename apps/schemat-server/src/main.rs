use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use objkit::{kernel, FileLayer, LayeredStore, MemoryLayer, StoreLayer, SystemBuilder};
use web_ingress::WebServerConfig;

mod shutdown;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Schemat Server - data-driven web platform where every entity is a web object
#[derive(Parser)]
#[command(name = "schemat-server")]
#[command(about = "Schemat Server - every entity is a web object")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (home_dir is normalized inside).
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::logging::init_logging_from_config(
        &logging_config,
        std::path::Path::new(&config.server.home_dir),
    );
    tracing::info!("Schemat Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(config).await,
    }
}

/// Open the layered store described by the configuration. With no layers
/// configured, the built-in demo store (kernel seed + writable memory)
/// keeps the server usable out of the box.
fn open_store(config: &AppConfig) -> Result<Arc<LayeredStore>> {
    if config.store.layers.is_empty() {
        tracing::warn!("no store layers configured; using the in-memory demo store");
        return Ok(kernel::demo_store());
    }

    let mut layers: Vec<Arc<dyn StoreLayer>> = Vec::new();
    for layer_cfg in &config.store.layers {
        let path = config.resolve_path(&layer_cfg.file);
        let layer: Arc<dyn StoreLayer> = if layer_cfg.readonly {
            Arc::new(
                FileLayer::open(&path)
                    .with_context(|| format!("opening store layer {}", path.display()))?,
            )
        } else {
            Arc::new(
                FileLayer::open_writable(
                    &path,
                    layer_cfg.id_start.unwrap_or(kernel::USER_ID_START),
                    layer_cfg.id_stop,
                )
                .with_context(|| format!("opening store layer {}", path.display()))?,
            )
        };
        layers.push(layer);
    }

    // A fully read-only stack still needs somewhere to write.
    if layers.iter().all(|l| l.readonly()) {
        tracing::info!("all configured layers are read-only; adding a writable memory layer");
        layers.insert(0, Arc::new(MemoryLayer::new(kernel::USER_ID_START, None)));
    }
    Ok(Arc::new(LayeredStore::new(layers)))
}

async fn run_server(config: AppConfig) -> Result<()> {
    let store = open_store(&config)?;

    let code_root = if config.site.code_root.is_empty() {
        PathBuf::from(&config.server.home_dir)
    } else {
        config.resolve_path(&config.site.code_root)
    };

    let system = SystemBuilder::new(store)
        .with_site(config.site.site_id.into())
        .with_code_root(code_root)
        .with_default_ttl(config.site.default_ttl_sec)
        .boot()
        .await
        .context("system boot failed")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;

    let cancel = CancellationToken::new();
    shutdown::cancel_on_signal(cancel.clone());

    let server_config = WebServerConfig {
        timeout: Duration::from_secs(config.server.timeout_sec.max(1)),
        purge_interval: Duration::from_secs(60),
    };
    web_ingress::serve(system, addr, server_config, cancel).await
}

async fn check_config(config: AppConfig) -> Result<()> {
    // Opening the store validates every configured layer file.
    let _store = open_store(&config)?;
    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}
