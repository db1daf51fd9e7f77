use std::sync::Arc;
use team_trading::config::Config;
use team_trading::services::{SqliteStore, TradingService};
use team_trading::AppState;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "team_trading=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting team trading server on {}:{}", config.host, config.port);

    let sqlite = Arc::new(SqliteStore::open(&config.database_path)?);
    info!("Ledger database: {}", config.database_path);

    let trading_service = Arc::new(
        TradingService::with_config(sqlite, config.execution_config())
            .with_price_model(Arc::new(config.price_model())),
    );

    let state = AppState {
        config: config.clone(),
        trading_service,
    };
    let app = team_trading::app(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Team trading server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
