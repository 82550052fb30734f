use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use ledger_rs::{config::Config, db, ledger_router};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting ledger service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(host = %config.host, port = config.port, "Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let app = ledger_router(pool).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = config.bind_addr();
    tracing::info!("Ledger service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
