//! The Auth Gate (spec §4.6): inspects `Authorization: Bearer <token>` and a
//! session cookie, resolves an [`Identity`], and flags root. Unauthenticated
//! requests are allowed to reach the pipeline — the handler decides whether
//! to `cancel(401)`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use http::header;

use crate::config::SecurityConfig;
use crate::identity::Identity;
use crate::jwt::TokenValidator;

const SESSION_COOKIE: &str = "basin_session";

/// The result of running the Auth Gate over an inbound request.
#[derive(Debug, Clone, Default)]
pub struct AuthOutcome {
    pub identity: Option<Identity>,
    pub is_root: bool,
}

impl AuthOutcome {
    pub fn anonymous(dev_mode: bool) -> Self {
        AuthOutcome { identity: None, is_root: dev_mode }
    }
}

/// Extract the bearer token from the `Authorization` header, falling back
/// to the `basin_session` cookie.
pub fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| find_cookie(cookies, SESSION_COOKIE))
}

fn find_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        (key == name).then(|| value.to_string())
    })
}

/// Resolve the auth outcome for an inbound request: a valid token yields an
/// identity and root elevation is determined by `role == "root"` or dev
/// mode; a missing or invalid token yields an anonymous outcome (never an
/// error — the pipeline itself decides what to do with the absence of
/// credentials).
pub fn resolve(parts: &Parts, validator: &TokenValidator, config: &SecurityConfig) -> AuthOutcome {
    let Some(token) = extract_token(parts) else {
        return AuthOutcome::anonymous(config.dev_mode);
    };
    match validator.verify(&token) {
        Ok(claims) => {
            let is_root = config.dev_mode || claims.role == "root";
            AuthOutcome { identity: Some(claims.into()), is_root }
        }
        Err(err) => {
            tracing::debug!("auth gate rejected token: {err}");
            AuthOutcome::anonymous(config.dev_mode)
        }
    }
}

impl<S> FromRequestParts<S> for AuthOutcome
where
    S: Send + Sync,
    TokenValidator: axum::extract::FromRef<S>,
    SecurityConfig: axum::extract::FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let validator = TokenValidator::from_ref(state);
        let config = SecurityConfig::from_ref(state);
        Ok(resolve(parts, &validator, &config))
    }
}
