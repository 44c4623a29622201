//! Binary entrypoint: loads configuration, wires the storage backend,
//! security, and handler cache into shared state, installs the standard
//! plugin stack, and serves.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use basin_core::{
    AppBuilder, BasinConfig, Cors, ErrorHandling, Health, NormalizePath, RequestIdPlugin,
    SecureHeaders, Tracing,
};
use basin_data::{MemoryAdapter, PostgresAdapter, StorageAdapter};
use basin_script::{HandlerCache, HandlerWatcher};
use basin_security::{SecurityConfig, TokenValidator};

use basin::{router, AppState, DescriptorStore};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = BasinConfig::load("dev").unwrap_or_else(|err| {
        eprintln!("config load failed: {err}; continuing with environment-only config");
        BasinConfig::empty()
    });

    let collections_dir: String = config.get_or("app.collections_dir", "collections".to_string());
    let bind_addr: String = config.get_or("app.bind_addr", "0.0.0.0:8080".to_string());
    let handler_timeout_ms: i64 = config.get_or("app.handler_timeout_ms", 5_000);

    let security_config = SecurityConfig::from_basin_config(&config);
    let token_validator = TokenValidator::new(&security_config);

    let storage: Arc<dyn StorageAdapter> = match config.get_or("app.storage.backend", "memory".to_string()).as_str() {
        "postgres" => {
            let dsn: String = config
                .get("app.storage.dsn")
                .expect("app.storage.dsn is required when app.storage.backend = postgres");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&dsn)
                .await
                .expect("failed to connect to postgres");
            Arc::new(PostgresAdapter::new(pool))
        }
        _ => Arc::new(MemoryAdapter::new()),
    };

    let descriptors = Arc::new(DescriptorStore::new(&collections_dir));
    descriptors.load_all().expect("failed to load collection descriptors");

    let handler_cache = Arc::new(HandlerCache::new(&collections_dir));
    let _watcher = HandlerWatcher::start(&collections_dir, handler_cache.clone())
        .map_err(|err| tracing::warn!("handler watcher failed to start: {err}"))
        .ok();

    let state = AppState {
        storage,
        descriptors,
        handler_cache,
        token_validator: Arc::new(token_validator),
        security_config,
        handler_timeout: Duration::from_millis(handler_timeout_ms.max(0) as u64),
    };

    let addr: SocketAddr = bind_addr.parse().expect("app.bind_addr must be a valid socket address");

    AppBuilder::new()
        .build_state(move |_beans| state)
        .with(RequestIdPlugin)
        .with(Tracing)
        .with(Cors::permissive())
        .with(SecureHeaders)
        .with(ErrorHandling)
        .with(Health::builder().build())
        .merge_router(router::build_router())
        .with(NormalizePath)
        .serve(addr)
        .await
}
