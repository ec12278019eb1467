pub mod api;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

pub use config::Config;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve") => run_server(config).await,

        Some("init") => {
            if Config::create_default_if_missing()? {
                println!("Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists.");
            }
            Ok(())
        }

        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(())
        }

        Some(other) => {
            println!("Unknown command: {other}");
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("FinTrack - Personal Finance Tracker API");
    println!();
    println!("USAGE:");
    println!("  fintrack [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("  serve    Run the HTTP API server (default)");
    println!("  init     Create default config file");
    println!("  help     Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml, or set JWT_SECRET / EMAIL_API_KEY / DATABASE_URL.");
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    info!("FinTrack v{} starting...", env!("CARGO_PKG_VERSION"));

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = api::create_app_state_from_config(config).await?;
    let app = api::router(state).await?;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening at http://{addr}");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {e}");
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    server.abort();
    info!("Server stopped");

    Ok(())
}
