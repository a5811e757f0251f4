use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::provider::{GeoPoint, Provider, DEFAULT_MAX_CONCURRENT_JOBS};
use crate::models::review::Review;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", post(create_provider).get(list_providers))
        .route("/providers/:id", get(get_provider))
        .route("/providers/:id/availability", patch(update_availability))
        .route("/providers/:id/location", patch(update_location))
        .route("/providers/:id/reviews", get(list_reviews))
}

#[derive(Deserialize)]
pub struct CreateProviderRequest {
    pub name: String,
    pub category: String,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub rating: f64,
    pub average_response_time_minutes: Option<f64>,
    pub max_concurrent_jobs: Option<u32>,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProviderRequest>,
) -> Result<Json<Provider>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.category.trim().is_empty() {
        return Err(AppError::BadRequest("category cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        if location.is_null_island() {
            return Err(AppError::BadRequest(
                "location (0, 0) is reserved for unset coordinates".to_string(),
            ));
        }
    }

    let provider = state.directory.insert(Provider {
        id: Uuid::new_v4(),
        name: payload.name,
        category: payload.category,
        available: true,
        rating: payload.rating.clamp(0.0, 5.0),
        reviews_count: 0,
        jobs_done: 0,
        location: payload.location,
        geohash: None,
        average_response_time_minutes: payload.average_response_time_minutes,
        current_active_jobs: 0,
        max_concurrent_jobs: payload
            .max_concurrent_jobs
            .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
        updated_at: Utc::now(),
    });

    Ok(Json(provider))
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<Provider>> {
    Json(state.directory.list())
}

async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Provider>, AppError> {
    let provider = state
        .directory
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("provider {id} not found")))?;
    Ok(Json(provider))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Provider>, AppError> {
    let provider = state.directory.set_availability(&id, payload.available)?;
    Ok(Json(provider))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Provider>, AppError> {
    if payload.location.is_null_island() {
        return Err(AppError::BadRequest(
            "location (0, 0) is reserved for unset coordinates".to_string(),
        ));
    }

    let provider = state.directory.set_location(&id, payload.location)?;
    Ok(Json(provider))
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<Review>> {
    let mut reviews: Vec<Review> = state
        .reviews
        .iter()
        .filter(|entry| entry.provider_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(reviews)
}
