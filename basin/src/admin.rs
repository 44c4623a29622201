//! The administrative API (spec §6): manages collection descriptors and
//! handler sources. Out of scope beyond "mutates the descriptor store and
//! invalidates the handler cache" — this is a plain CRUD surface over
//! [`DescriptorStore`](crate::descriptor::DescriptorStore), with every
//! mutation invalidating that collection's cached handlers since a
//! rename/delete leaves stale cache keys behind even though descriptor
//! edits alone don't change any handler's fingerprint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use basin_core::AppError;
use basin_script::Event;
use serde::Deserialize;

use crate::descriptor::CollectionDescriptor;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/collections", get(list_collections).post(create_collection))
        .route(
            "/collections/{name}",
            get(get_collection).put(replace_collection).delete(delete_collection),
        )
        .route("/collections/{name}/rename", post(rename_collection))
        .route(
            "/collections/{name}/handlers/{event}",
            put(upload_handler).delete(delete_handler),
        )
}

async fn list_collections(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.descriptors.list())
}

async fn create_collection(
    State(state): State<AppState>,
    Json(descriptor): Json<CollectionDescriptor>,
) -> Result<impl IntoResponse, AppError> {
    state.descriptors.put(descriptor.clone()).map_err(to_app_error)?;
    state.handler_cache.invalidate_collection(&descriptor.name);
    Ok((StatusCode::CREATED, Json(descriptor)))
}

async fn get_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .descriptors
        .get(&name)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("unknown collection `{name}`")))
}

async fn replace_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut descriptor): Json<CollectionDescriptor>,
) -> Result<impl IntoResponse, AppError> {
    descriptor.name = name.clone();
    state.descriptors.put(descriptor.clone()).map_err(to_app_error)?;
    state.handler_cache.invalidate_collection(&name);
    Ok(Json(descriptor))
}

async fn delete_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.descriptors.contains(&name) {
        return Err(AppError::NotFound(format!("unknown collection `{name}`")));
    }
    state.descriptors.remove(&name).map_err(to_app_error)?;
    state.handler_cache.invalidate_collection(&name);
    state.storage.drop_collection(&name).await.map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.descriptors.contains(&name) {
        return Err(AppError::NotFound(format!("unknown collection `{name}`")));
    }
    state.descriptors.rename(&name, &request.name).map_err(to_app_error)?;
    state.storage.rename_collection(&name, &request.name).await.map_err(AppError::from)?;
    state.handler_cache.invalidate_collection(&name);
    state.handler_cache.invalidate_collection(&request.name);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct HandlerUpload {
    source: String,
}

async fn upload_handler(
    State(state): State<AppState>,
    Path((name, event_name)): Path<(String, String)>,
    Json(upload): Json<HandlerUpload>,
) -> Result<impl IntoResponse, AppError> {
    let event = parse_event(&event_name)?;
    if !state.descriptors.contains(&name) {
        return Err(AppError::NotFound(format!("unknown collection `{name}`")));
    }
    let dir = state.descriptors.handlers_dir(&name);
    std::fs::create_dir_all(&dir).map_err(AppError::from)?;
    let path = dir.join(format!("{}.lua", event.file_stem()));
    std::fs::write(&path, &upload.source).map_err(AppError::from)?;
    state.handler_cache.invalidate(&name, event);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_handler(
    State(state): State<AppState>,
    Path((name, event_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let event = parse_event(&event_name)?;
    let dir = state.descriptors.handlers_dir(&name);
    for ext in ["lua", "so"] {
        let path = dir.join(format!("{}.{ext}", event.file_stem()));
        if path.exists() {
            std::fs::remove_file(&path).map_err(AppError::from)?;
        }
    }
    state.handler_cache.invalidate(&name, event);
    Ok(StatusCode::NO_CONTENT)
}

fn parse_event(name: &str) -> Result<Event, AppError> {
    match name {
        "beforerequest" => Ok(Event::BeforeRequest),
        "validate" => Ok(Event::Validate),
        "get" => Ok(Event::Get),
        "post" => Ok(Event::Post),
        "put" => Ok(Event::Put),
        "delete" => Ok(Event::Delete),
        "aftercommit" => Ok(Event::AfterCommit),
        other => Err(AppError::NotFound(format!("unknown event `{other}`"))),
    }
}

fn to_app_error(err: crate::descriptor::DescriptorError) -> AppError {
    AppError::Backend(err.to_string())
}
