pub mod beans;
pub mod builder;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod layers;
pub mod plugin;
pub mod plugins;
pub mod request_id;
pub mod secure_headers;
pub mod state;

pub use beans::{BeanError, BeanRegistry};
pub use builder::{AppBuilder, NoState};
pub use config::{BasinConfig, ConfigError, ConfigValue, FromConfigValue};
pub use error::AppError;
pub use layers::{default_cors, default_trace, init_tracing};
pub use plugin::Plugin;
pub use plugins::{Cors, ErrorHandling, Health, NormalizePath, Tracing};
pub use request_id::{RequestId, RequestIdPlugin};
pub use secure_headers::SecureHeaders;
pub use state::BasinState;
