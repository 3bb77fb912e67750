use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use family_benefits_api::config;
use family_benefits_api::database::{self, PgStore, Store};
use family_benefits_api::{app, mail, AppState};

#[derive(Parser)]
#[command(name = "family-benefits-api")]
#[command(about = "Family benefits directory API server")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides API_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Address to bind (overrides API_BIND)")]
    bind: Option<String>,

    #[arg(long, help = "Apply database migrations before serving")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // CONFIG is read only after .env has been loaded above
    let mut config = config::config().clone();
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(bind) = args.bind {
        config.api.bind = bind;
    }
    tracing::info!("Starting Family Benefits API in {:?} mode", config.environment);

    let store: Arc<dyn Store> = if args.migrate {
        let pg = PgStore::connect(&config.database).await?;
        pg.migrate().await?;
        Arc::new(pg)
    } else {
        database::open_store(&config).await?
    };
    let mailer = mail::build_mailer(&config.mail)?;

    let bind_addr = format!("{}:{}", config.api.bind, config.api.port);
    let state = AppState::new(config, store, mailer)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
