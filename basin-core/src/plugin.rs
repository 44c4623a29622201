//! Plugin system.
//!
//! Plugins are composable units of functionality installed into an
//! [`AppBuilder`](crate::builder::AppBuilder) via `.with(plugin)`. They can
//! add layers, register routes, or register shutdown hooks.

use crate::builder::AppBuilder;

/// A composable unit of functionality installed into an [`AppBuilder`].
pub trait Plugin: Send + 'static {
    /// Install this plugin into the given builder, returning the modified
    /// builder.
    fn install<T: Clone + Send + Sync + 'static>(self, app: AppBuilder<T>) -> AppBuilder<T>;

    /// Whether this plugin must be the outermost layer (installed last).
    fn should_be_last() -> bool
    where
        Self: Sized,
    {
        false
    }

    fn name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}
