use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use syspilot::actions::{Platform, ShellExecutor};
use syspilot::config::Config;
use syspilot::server;
use syspilot::service::ControlPanel;
use syspilot::store::SqliteStore;
use syspilot::token::TokenService;

/// SysPilot - local control panel for host power, media and metrics
#[derive(Parser, Debug)]
#[command(name = "syspilot", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// SQLite database path, overrides the config file
    #[arg(short, long)]
    database: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(database) = &args.database {
        config.database.path = database.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "refusing to start");
            return Err(e);
        }
    };

    let platform = Platform::current();
    info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        platform = platform.name(),
        "SysPilot starting"
    );

    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    let panel = ControlPanel::new(
        TokenService::new(config.auth.secret_key.as_bytes()),
        store.clone(),
        store,
        Arc::new(ShellExecutor::new()),
        platform,
    );
    panel.bootstrap(&config.auth.default_username, &config.auth.default_password)?;

    let app = server::router(Arc::new(panel));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
