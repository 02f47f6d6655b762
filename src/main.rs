use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use buildboard_backend::api::{self, AppState};
use buildboard_backend::catalog::{CatalogProvider, FileCatalogSource};
use buildboard_backend::config::Config;
use buildboard_backend::db::Database;
use buildboard_backend::rate_limit::RateLimiter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let catalogs = CatalogProvider::new(
        Arc::new(FileCatalogSource::new(&config.catalog_dir)),
        config.catalog_refresh,
    );

    let state = AppState {
        db: Arc::new(db),
        catalogs: Arc::new(catalogs),
        rate_limiter: RateLimiter::new(1, config.sync_cooldown),
        default_locale: config.default_locale.clone(),
    };

    // Periodically drop idle rate-limit buckets.
    let limiter = state.rate_limiter.clone();
    let prune_every = config.sync_cooldown.max(std::time::Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_every);
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(
        catalog_dir = %config.catalog_dir.display(),
        locale = %config.default_locale,
        "Buildboard backend listening on {addr}"
    );
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
