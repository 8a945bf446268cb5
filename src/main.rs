// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use newsroom::config::Config;
use newsroom::routes;
use newsroom::state::AppState;
use newsroom::store::{MemoryStore, PgStore, Store};
use newsroom::utils::files::LocalFileStore;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "newsroom.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(connect_postgres(url).await),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store. Data is lost on exit.");
            Arc::new(MemoryStore::new())
        }
    };

    let files = match LocalFileStore::new(&config.upload_dir) {
        Ok(files) => files,
        Err(e) => panic!(
            "Failed to prepare upload directory {}: {}",
            config.upload_dir.display(),
            e
        ),
    };

    let state = AppState {
        store,
        files: Arc::new(files),
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("Failed to bind listen address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

/// Connects with retry, then applies pending migrations.
async fn connect_postgres(url: &str) -> PgStore {
    let mut retry_count = 0;
    let pool = loop {
        match PgStore::connect(url, 5).await {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };
    tracing::info!("Database connected...");

    let store = PgStore::new(pool);

    tracing::info!("Running migrations...");
    if let Err(e) = store.run_migrations().await {
        panic!("Failed to run database migrations: {}", e);
    }
    tracing::info!("Migrations applied successfully.");

    store
}
