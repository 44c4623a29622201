//! The Router (spec §4.7): reserved prefixes (`/_admin`, `/auth`) are
//! claimed first; everything else is `/{collection}`,
//! `/{collection}/count`, `/{collection}/{id}`, dispatched dynamically
//! against whatever descriptors are currently registered. Static routes
//! outrank the `{collection}` wildcard in axum's router, so `/health` and
//! `/_admin/...` never fall through to the dynamic dispatch below.

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use basin_core::AppError;
use basin_security::AuthOutcome;
use serde_json::Value;

use crate::descriptor::CollectionDescriptor;
use crate::querystring::parse_query_string;
use crate::state::AppState;
use crate::{admin, auth_routes, resource};

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth_routes::login))
        .nest("/_admin", admin::router())
        .route("/{collection}", get(list).post(create))
        .route("/{collection}/count", get(count))
        .route("/{collection}/{id}", get(get_one).put(update).delete(remove))
}

fn descriptor_or_404(state: &AppState, collection: &str) -> Result<CollectionDescriptor, AppError> {
    state
        .descriptors
        .get(collection)
        .ok_or_else(|| AppError::NotFound(format!("unknown collection `{collection}`")))
}

fn body_as_document(body: Value) -> Result<basin_query::Document, AppError> {
    body.as_object().cloned().ok_or_else(|| {
        let mut errors = std::collections::BTreeMap::new();
        errors.insert("_".to_string(), "request body must be a JSON object".to_string());
        AppError::Validation(errors)
    })
}

async fn list(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    auth: AuthOutcome,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = descriptor_or_404(&state, &collection)?;
    let query_json = parse_query_string(raw.as_deref().unwrap_or(""));
    let result = resource::list(&state, &collection, &descriptor, &auth, &query_json).await?;
    Ok(Json(result))
}

async fn count(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    auth: AuthOutcome,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = descriptor_or_404(&state, &collection)?;
    let query_json = parse_query_string(raw.as_deref().unwrap_or(""));
    let total = resource::count(&state, &collection, &descriptor, &auth, &query_json).await?;
    Ok(Json(total))
}

async fn get_one(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    auth: AuthOutcome,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = descriptor_or_404(&state, &collection)?;
    let query_json = parse_query_string(raw.as_deref().unwrap_or(""));
    let result = resource::get_one(&state, &collection, &descriptor, &auth, &id, &query_json).await?;
    Ok(Json(result))
}

async fn create(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    auth: AuthOutcome,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = descriptor_or_404(&state, &collection)?;
    let body = body_as_document(body)?;
    let result = resource::create(&state, &collection, &descriptor, &auth, body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn update(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    auth: AuthOutcome,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = descriptor_or_404(&state, &collection)?;
    let body = body_as_document(body)?;
    let result = resource::update(&state, &collection, &descriptor, &auth, &id, body).await?;
    Ok(Json(result))
}

async fn remove(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    auth: AuthOutcome,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = descriptor_or_404(&state, &collection)?;
    resource::delete(&state, &collection, &descriptor, &auth, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
