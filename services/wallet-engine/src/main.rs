use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallet_engine::{
    accounts::AccountService,
    config::{Config, StorageBackend},
    database::Database,
    handlers,
    memory::MemoryStore,
    metrics,
    security_middleware::{JwtAuth, JwtKeys},
    services::WalletService,
    store::WalletStore,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    metrics::register_metrics(prometheus::default_registry())
        .context("Failed to register metrics")?;

    info!(
        "Starting Wallet Engine on {}:{} ({:?} storage)",
        config.server.host, config.server.port, config.storage.backend
    );

    let store: Arc<dyn WalletStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = Database::new(
                &config.database.url,
                config.database.max_connections,
                config.database.min_connections,
                Duration::from_secs(config.database.acquire_timeout_secs),
            )
            .await
            .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            Arc::new(db)
        }
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let keys = Arc::new(JwtKeys::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.token_ttl_secs,
    ));
    let wallet_service = Arc::new(WalletService::new(store.clone(), config.transfer.clone()));
    let account_service = Arc::new(AccountService::new(store, keys.clone()));

    HttpServer::new(move || {
        App::new()
            .wrap(JwtAuth::new(keys.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(handlers::json_config())
            .app_data(web::Data::new(wallet_service.clone()))
            .app_data(web::Data::new(account_service.clone()))
            .configure(handlers::configure_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}

/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}
