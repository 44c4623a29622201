//! Cross-cutting tower layers shared by every plugin.

use std::sync::Once;

use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

static TRACING_INIT: Once = Once::new();

/// Initialise the global `tracing` subscriber once per process.
///
/// Writes structured logs to stdout, filtered by `RUST_LOG` (default
/// `info`). Safe to call more than once — later calls are no-ops.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}

/// A permissive CORS layer (any origin, method, header). Development use.
pub fn default_cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Standard request/response trace layer, logged at `DEBUG`.
pub fn default_trace() -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

/// Converts panics inside handlers into a JSON 500 instead of tearing down
/// the connection, so one broken handler invocation cannot take a worker
/// down mid-response.
pub fn catch_panic_layer() -> CatchPanicLayer<fn(Box<dyn std::any::Any + Send>) -> axum::response::Response> {
    CatchPanicLayer::custom(handle_panic)
}

fn handle_panic(err: Box<dyn std::any::Any + Send>) -> axum::response::Response {
    let message = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("panic in handler: {message}");
    axum::response::IntoResponse::into_response((
        http::StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({ "error": "internal error" })),
    ))
}
