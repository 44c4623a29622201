//! The two-phase application builder.
//!
//! `AppBuilder<NoState>` collects beans and pre-state configuration;
//! [`AppBuilder::build_state`] resolves the application's shared state and
//! transitions to `AppBuilder<T>`, at which point routes, layers, and
//! plugins can be installed. `build()` produces a plain `axum::Router`;
//! `serve()` binds it and runs with graceful shutdown on ctrl-c.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::beans::BeanRegistry;

/// Marker type for the pre-state phase.
#[derive(Clone, Copy)]
pub struct NoState;

pub struct AppBuilder<T = NoState>
where
    T: Clone + Send + Sync + 'static,
{
    state: T,
    beans: BeanRegistry,
    router: Router<T>,
    layers: Vec<Box<dyn FnOnce(Router) -> Router + Send>>,
    shutdown_hooks: Vec<Box<dyn FnOnce() + Send>>,
    normalize_path: bool,
}

impl AppBuilder<NoState> {
    pub fn new() -> Self {
        Self {
            state: NoState,
            beans: BeanRegistry::new(),
            router: Router::new(),
            layers: Vec::new(),
            shutdown_hooks: Vec::new(),
            normalize_path: false,
        }
    }

    /// Register a bean, available to [`build_state`](Self::build_state)'s
    /// state-construction closure.
    pub fn provide<B: Send + Sync + 'static>(mut self, bean: B) -> Self {
        self.beans.provide(bean);
        self
    }

    pub fn beans(&self) -> &BeanRegistry {
        &self.beans
    }

    /// Resolve the application's shared state and transition to the
    /// post-state phase, where routes and plugins can be installed.
    pub fn build_state<T, F>(self, build: F) -> AppBuilder<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&BeanRegistry) -> T,
    {
        let state = build(&self.beans);
        // The pre-state phase never registers routes, so there's nothing
        // to carry over from `self.router` — it starts fresh, now typed
        // over the resolved state.
        AppBuilder {
            state,
            beans: self.beans,
            router: Router::new(),
            layers: self.layers,
            shutdown_hooks: self.shutdown_hooks,
            normalize_path: self.normalize_path,
        }
    }
}

impl Default for AppBuilder<NoState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> AppBuilder<T> {
    /// Merge additional routes into the router under construction. The
    /// primary escape hatch for mounting a dynamically-built sub-router
    /// (the collection router, the admin API) alongside plugin-installed
    /// routes.
    pub fn register_routes(mut self, routes: Router<T>) -> Self {
        self.router = self.router.merge(routes);
        self
    }

    /// Alias for [`register_routes`](Self::register_routes); both names
    /// appear in the wild depending on whether the caller thinks of the
    /// argument as "more routes" or "another router".
    pub fn merge_router(self, routes: Router<T>) -> Self {
        self.register_routes(routes)
    }

    /// Queue a layer to be applied to the final router in registration
    /// order (first registered, innermost).
    pub fn with_layer_fn<F>(mut self, layer_fn: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.layers.push(Box::new(layer_fn));
        self
    }

    /// Install a plugin.
    pub fn with<P: crate::plugin::Plugin>(self, plugin: P) -> Self {
        plugin.install(self)
    }

    pub fn on_shutdown<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shutdown_hooks.push(Box::new(hook));
        self
    }

    pub fn enable_normalize_path(mut self) -> Self {
        self.normalize_path = true;
        self
    }

    pub fn beans(&self) -> &BeanRegistry {
        &self.beans
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    /// Finalize the router: apply queued layers in order and attach shared
    /// state.
    pub fn build(self) -> (Router, Vec<Box<dyn FnOnce() + Send>>) {
        if self.normalize_path {
            tracing::debug!("trailing-slash normalization requested");
        }
        let mut router = self.router.with_state(self.state.clone());
        for layer in self.layers {
            router = layer(router);
        }
        (router, self.shutdown_hooks)
    }

    /// Bind `addr` and serve until ctrl-c, then run shutdown hooks in
    /// registration order.
    pub async fn serve(self, addr: impl Into<SocketAddr>) -> std::io::Result<()> {
        let (router, shutdown_hooks) = self.build();
        let listener = TcpListener::bind(addr.into()).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        for hook in shutdown_hooks {
            hook();
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate: std::future::Pending<()> = std::future::pending();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Helper so callers don't need to name the opaque future type of
/// `shutdown_signal` when composing their own graceful-shutdown logic.
pub fn ctrl_c_or_sigterm() -> impl Future<Output = ()> {
    shutdown_signal()
}
