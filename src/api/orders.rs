use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::archive::{archive_order, ReviewInput};
use crate::engine::lifecycle::{
    self, accept_quote, cancel_order, create_order, expand_radius, reject_quote, request_closure,
    submit_quote,
};
use crate::error::AppError;
use crate::external::messaging::SystemMessage;
use crate::external::triage::TriageClassification;
use crate::models::order::{ArchivedOrder, Order, Priority};
use crate::models::provider::GeoPoint;
use crate::models::quote::Quote;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create).get(list))
        .route("/orders/:id", get(get_order).delete(cancel))
        .route("/orders/:id/expand", post(expand))
        .route("/orders/:id/quotes", post(quote_submit).get(quote_list))
        .route("/orders/:id/quotes/:quote_id/accept", post(quote_accept))
        .route("/orders/:id/quotes/:quote_id/reject", post(quote_reject))
        .route("/orders/:id/complete", post(complete))
        .route("/orders/:id/archive", post(archive))
        .route("/archives/:id", get(get_archived))
        .route("/channels/:id/messages", get(channel_messages))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub requester_id: Uuid,
    pub category: Option<String>,
    pub description: String,
    pub location: GeoPoint,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub images: Vec<String>,
    pub provider_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct CreateOrderResponse {
    pub order: Order,
    pub triage: Option<TriageClassification>,
}

#[derive(Deserialize)]
pub struct SubmitQuoteRequest {
    pub provider_id: Uuid,
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    pub provider_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rating: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize, Default)]
pub struct ArchiveRequest {
    pub review: Option<ReviewRequest>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let created = create_order(state, lifecycle::NewOrder {
        requester_id: payload.requester_id,
        category: payload.category,
        description: payload.description,
        location: payload.location,
        priority: payload.priority,
        urgent: payload.urgent,
        images: payload.images,
        provider_id: payload.provider_id,
    })
    .await?;

    Ok(Json(CreateOrderResponse {
        order: created.order,
        triage: created.triage,
    }))
}

async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(state.orders.list())
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = cancel_order(state, id).await?;
    Ok(Json(order))
}

async fn expand(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = expand_radius(state, id).await?;
    Ok(Json(order))
}

async fn quote_submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitQuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    let quote = submit_quote(
        state,
        id,
        payload.provider_id,
        payload.price,
        payload.description,
    )
    .await?;
    Ok(Json(quote))
}

async fn quote_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Quote>>, AppError> {
    state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(state.quotes.list_for_order(&id)))
}

async fn quote_accept(
    State(state): State<Arc<AppState>>,
    Path((id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Order>, AppError> {
    let order = accept_quote(state, id, quote_id).await?;
    Ok(Json(order))
}

async fn quote_reject(
    State(state): State<Arc<AppState>>,
    Path((id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    let quote = reject_quote(state, id, quote_id).await?;
    Ok(Json(quote))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<Order>, AppError> {
    let provider_id = payload.and_then(|Json(p)| p.provider_id);
    let order = request_closure(state, id, provider_id).await?;
    Ok(Json(order))
}

async fn archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ArchiveRequest>>,
) -> Result<Json<ArchivedOrder>, AppError> {
    let review = payload
        .and_then(|Json(p)| p.review)
        .map(|review| ReviewInput {
            rating: review.rating,
            comment: review.comment,
            images: review.images,
        });

    let archived = archive_order(state, id, review).await?;
    Ok(Json(archived))
}

async fn get_archived(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArchivedOrder>, AppError> {
    let archived = state
        .orders
        .get_archived(&id)
        .ok_or_else(|| AppError::NotFound(format!("archived order {id} not found")))?;
    Ok(Json(archived))
}

async fn channel_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SystemMessage>>, AppError> {
    let messages = state
        .messaging
        .messages(&id)
        .ok_or_else(|| AppError::NotFound(format!("channel {id} not found")))?;
    Ok(Json(messages))
}
