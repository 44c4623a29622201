//! `POST /auth/login` (spec §6): exchanges the configured master key for a
//! signed bearer token. The only credential this system accepts besides a
//! previously issued token.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use basin_core::AppError;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "masterKey")]
    pub master_key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    #[serde(rename = "expiresIn")]
    expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.master_key != state.security_config.master_key {
        return Err(AppError::Unauthorized("invalid master key".to_string()));
    }
    let ttl = state.security_config.token_ttl_secs;
    let token = state.token_validator.issue("root", "root", "root", ttl);
    Ok(Json(LoginResponse { token, expires_in: ttl }))
}
