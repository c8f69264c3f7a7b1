use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::error::ApiError;
use crate::media::MediaHost;
use crate::model::ImageView;
use crate::store::MetadataStore;
use crate::upload::{self, UPLOAD_BODY_LIMIT};
use crate::web;

/// Shared collaborators, injected once at startup. Both are trait
/// objects so tests run against fakes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub media: Arc<dyn MediaHost>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/gallery", get(web::gallery_page))
        .route(
            "/api/upload",
            post(upload_images).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/images", get(list_images))
        .route("/api/images/{id}", delete(delete_image))
        .route("/api/download/{id}", get(download_by_id))
        .route("/api/download/file/{filename}", get(download_by_filename))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "image-gallery" }))
}

async fn upload_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<ImageView>>), ApiError> {
    let files = upload::collect_files(multipart).await?;
    upload::validate_batch(&files)?;
    let records = upload::run(&state.media, &state.store, files).await?;
    tracing::info!(count = records.len(), "stored upload batch");
    Ok((
        StatusCode::CREATED,
        Json(records.into_iter().map(ImageView::from).collect()),
    ))
}

async fn list_images(State(state): State<AppState>) -> Result<Json<Vec<ImageView>>, ApiError> {
    let records = state.store.find_all_sorted().await?;
    Ok(Json(records.into_iter().map(ImageView::from).collect()))
}

async fn download_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect, ApiError> {
    let record = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Redirect::temporary(&record.path))
}

async fn download_by_filename(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Redirect, ApiError> {
    let record = state
        .store
        .find_by_filename(&filename)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Redirect::temporary(&record.path))
}

#[derive(Serialize)]
struct DeleteOutcome {
    message: &'static str,
    remote_cleanup: bool,
}

async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let record = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let handle = record
        .public_id
        .clone()
        .or_else(|| state.media.legacy_public_id(&record.path));

    // Best-effort remote delete: the metadata record goes away even if
    // the stored object survives, and the outcome is reported.
    let remote_cleanup = match handle {
        Some(handle) => match state.media.destroy(&handle).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, image = %record.id, "media host deletion failed");
                false
            }
        },
        None => {
            tracing::warn!(image = %record.id, "no deletion handle could be derived");
            false
        }
    };

    state.store.delete_by_id(&id).await?;
    Ok(Json(DeleteOutcome {
        message: "Image deleted successfully",
        remote_cleanup,
    }))
}
