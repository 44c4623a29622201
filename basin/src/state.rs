//! The application's shared state (spec §4.5/§4.6): storage, descriptors,
//! the handler cache, and the pieces the Auth Gate extractor needs via
//! `FromRef`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use basin_data::StorageAdapter;
use basin_script::HandlerCache;
use basin_security::{SecurityConfig, TokenValidator};

use crate::descriptor::DescriptorStore;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageAdapter>,
    pub descriptors: Arc<DescriptorStore>,
    pub handler_cache: Arc<HandlerCache>,
    pub token_validator: Arc<TokenValidator>,
    pub security_config: SecurityConfig,
    pub handler_timeout: Duration,
}

impl FromRef<AppState> for TokenValidator {
    fn from_ref(state: &AppState) -> Self {
        (*state.token_validator).clone()
    }
}

impl FromRef<AppState> for SecurityConfig {
    fn from_ref(state: &AppState) -> Self {
        state.security_config.clone()
    }
}
