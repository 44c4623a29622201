//! Built-in plugins for common cross-cutting concerns.

use std::sync::Arc;
use std::time::Instant;

use tower_http::cors::CorsLayer;

use crate::builder::AppBuilder;
use crate::health::{HealthIndicator, HealthState};
use crate::plugin::Plugin;

/// CORS plugin. [`Cors::permissive`] is development-friendly; prefer
/// [`Cors::custom`] with a locked-down `CorsLayer` in production.
pub struct Cors {
    layer: CorsLayer,
}

impl Cors {
    pub fn permissive() -> Self {
        Self { layer: crate::layers::default_cors() }
    }

    pub fn custom(layer: CorsLayer) -> Self {
        Self { layer }
    }
}

impl Plugin for Cors {
    fn install<T: Clone + Send + Sync + 'static>(self, app: AppBuilder<T>) -> AppBuilder<T> {
        app.with_layer_fn(move |router| router.layer(self.layer))
    }
}

/// Lightweight request/response tracing. Initialises the global `tracing`
/// subscriber and adds a tower-http `TraceLayer`.
pub struct Tracing;

impl Plugin for Tracing {
    fn install<T: Clone + Send + Sync + 'static>(self, app: AppBuilder<T>) -> AppBuilder<T> {
        crate::layers::init_tracing();
        app.with_layer_fn(|router| router.layer(crate::layers::default_trace()))
    }
}

/// Health-check endpoint plugin. Use [`Health::builder`] to register
/// indicators for `/health`, `/health/live`, and `/health/ready`.
pub struct Health {
    checks: Vec<Box<dyn HealthIndicator>>,
}

impl Health {
    pub fn builder() -> HealthBuilder {
        HealthBuilder { checks: Vec::new() }
    }
}

pub struct HealthBuilder {
    checks: Vec<Box<dyn HealthIndicator>>,
}

impl HealthBuilder {
    pub fn check<H: HealthIndicator>(mut self, indicator: H) -> Self {
        self.checks.push(Box::new(indicator));
        self
    }

    pub fn build(self) -> Health {
        Health { checks: self.checks }
    }
}

impl Plugin for Health {
    fn install<T: Clone + Send + Sync + 'static>(self, app: AppBuilder<T>) -> AppBuilder<T> {
        let state = Arc::new(HealthState { checks: self.checks, start_time: Instant::now() });
        app.register_routes(
            crate::http::Router::<T>::new()
                .route("/health", axum::routing::get(crate::health::health_handler))
                .route("/health/live", axum::routing::get(crate::health::liveness_handler))
                .route("/health/ready", axum::routing::get(crate::health::readiness_handler))
                .layer(axum::Extension(state)),
        )
    }
}

/// Converts panics inside handlers into a JSON 500.
pub struct ErrorHandling;

impl Plugin for ErrorHandling {
    fn install<T: Clone + Send + Sync + 'static>(self, app: AppBuilder<T>) -> AppBuilder<T> {
        app.with_layer_fn(|router| router.layer(crate::layers::catch_panic_layer()))
    }
}

/// Strips trailing slashes so `/users/` and `/users` route identically.
pub struct NormalizePath;

impl Plugin for NormalizePath {
    fn install<T: Clone + Send + Sync + 'static>(self, app: AppBuilder<T>) -> AppBuilder<T> {
        app.enable_normalize_path()
    }

    fn should_be_last() -> bool {
        true
    }
}

/// A simple health indicator backed by a closure — useful for quick adapter
/// liveness probes.
pub struct ClosureHealthIndicator<F> {
    name: &'static str,
    affects_readiness: bool,
    check_fn: F,
}

impl<F> ClosureHealthIndicator<F> {
    pub fn new(name: &'static str, affects_readiness: bool, check_fn: F) -> Self {
        Self { name, affects_readiness, check_fn }
    }
}

impl<F, Fut> HealthIndicator for ClosureHealthIndicator<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = crate::health::HealthStatus> + Send + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::health::HealthStatus> + Send + '_>> {
        Box::pin((self.check_fn)())
    }

    fn affects_readiness(&self) -> bool {
        self.affects_readiness
    }
}
