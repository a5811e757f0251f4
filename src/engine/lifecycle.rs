//! Order state machine: creation, quote handling, replacement search,
//! manual radius expansion and cancellation. Every transition that
//! mutates an order goes through the store's compare-and-swap primitive.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::search::{find_best_providers, RADIUS_LADDER_KM};
use crate::error::AppError;
use crate::external::triage::{fallback_classification, TriageClassification};
use crate::models::order::{Order, OrderStatus, Priority};
use crate::models::provider::GeoPoint;
use crate::models::quote::{Quote, QuoteStatus};
use crate::state::AppState;

/// Requesters may widen the search once, to this radius, after waiting.
pub const EXPANDED_RADIUS_KM: f64 = 2.0;
pub const EXPANSION_WAIT_MINUTES: i64 = 30;

pub struct NewOrder {
    pub requester_id: Uuid,
    pub category: Option<String>,
    pub description: String,
    pub location: GeoPoint,
    pub priority: Option<Priority>,
    pub urgent: bool,
    pub images: Vec<String>,
    /// Direct-target provider; skips the shortlist search entirely.
    pub provider_id: Option<Uuid>,
}

pub struct CreatedOrder {
    pub order: Order,
    pub triage: Option<TriageClassification>,
}

/// Runs one radius ladder with metrics and latency recorded under `kind`
/// (`initial`, `replacement` or `expansion`).
async fn run_shortlist_search(
    state: &AppState,
    kind: &str,
    category: &str,
    center: &GeoPoint,
    exclude: &BTreeSet<Uuid>,
) -> Vec<Uuid> {
    let start = Instant::now();
    let shortlist =
        find_best_providers(&state.directory, category, center, exclude, state.search_timeout)
            .await;

    state
        .metrics
        .search_latency_seconds
        .with_label_values(&[kind])
        .observe(start.elapsed().as_secs_f64());
    let outcome = if shortlist.is_empty() { "empty" } else { "found" };
    state
        .metrics
        .searches_total
        .with_label_values(&[outcome])
        .inc();

    shortlist
}

pub async fn create_order(state: Arc<AppState>, new_order: NewOrder) -> Result<CreatedOrder, AppError> {
    if new_order.description.trim().is_empty() {
        return Err(AppError::BadRequest("description cannot be empty".to_string()));
    }
    if new_order.location.is_null_island() {
        return Err(AppError::BadRequest("location is unset".to_string()));
    }

    let mut triage = None;
    let (category, priority, description) = if new_order.urgent {
        let classification = match state
            .triage
            .classify(&new_order.description, new_order.images.len())
            .await
        {
            Ok(classification) => classification,
            Err(err) => {
                warn!(error = %err, "triage unavailable; substituting fallback classification");
                fallback_classification(&new_order.description)
            }
        };

        let category = new_order
            .category
            .clone()
            .unwrap_or_else(|| classification.category.clone());
        let priority = Some(new_order.priority.unwrap_or(classification.priority));
        let description = if classification.estimated_price_range.is_empty() {
            classification.summary.clone()
        } else {
            format!(
                "{} (est. {})",
                classification.summary, classification.estimated_price_range
            )
        };
        triage = Some(classification);
        (category, priority, description)
    } else {
        let category = new_order
            .category
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("category is required".to_string()))?;
        (category, new_order.priority, new_order.description.clone())
    };

    let now = Utc::now();
    let mut order = Order {
        id: Uuid::new_v4(),
        requester_id: new_order.requester_id,
        category,
        description,
        priority,
        urgent: new_order.urgent,
        location: new_order.location,
        status: OrderStatus::Searching,
        images: new_order.images,
        targeted_providers: Vec::new(),
        contacted_provider_ids: BTreeSet::new(),
        rejected_provider_ids: BTreeSet::new(),
        search_radius_km: RADIUS_LADDER_KM[0],
        assigned_provider_id: None,
        assigned_price: None,
        created_at: now,
        updated_at: now,
    };

    match new_order.provider_id {
        Some(provider_id) => {
            state
                .directory
                .get(&provider_id)
                .ok_or_else(|| AppError::NotFound(format!("provider {provider_id} not found")))?;
            order.targeted_providers.push(provider_id);
            order.contacted_provider_ids.insert(provider_id);
        }
        None => {
            let shortlist = run_shortlist_search(
                &state,
                "initial",
                &order.category,
                &order.location,
                &BTreeSet::new(),
            )
            .await;
            order.contacted_provider_ids.extend(shortlist.iter().copied());
            order.targeted_providers = shortlist;
        }
    }

    state.orders.insert(order.clone());
    state.metrics.active_orders.inc();
    info!(
        order_id = %order.id,
        category = %order.category,
        contacted = order.contacted_provider_ids.len(),
        "order created"
    );

    Ok(CreatedOrder { order, triage })
}

pub async fn submit_quote(
    state: Arc<AppState>,
    order_id: Uuid,
    provider_id: Uuid,
    price: f64,
    description: String,
) -> Result<Quote, AppError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::BadRequest("price must be positive".to_string()));
    }

    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
    if order.status != OrderStatus::Searching {
        return Err(AppError::PreconditionFailed(
            "order is no longer accepting quotes".to_string(),
        ));
    }

    let provider = state
        .directory
        .get(&provider_id)
        .ok_or_else(|| AppError::NotFound(format!("provider {provider_id} not found")))?;

    let eligible = order.contacted_provider_ids.contains(&provider_id)
        || provider.category.eq_ignore_ascii_case(&order.category);
    if !eligible {
        return Err(AppError::BadRequest(
            "provider is not eligible to quote on this order".to_string(),
        ));
    }

    let quote = state.quotes.insert_guarded(Quote {
        id: Uuid::new_v4(),
        order_id,
        provider_id,
        price,
        description,
        status: QuoteStatus::Pending,
        created_at: Utc::now(),
    })?;

    // The order may have been cancelled between the status check and the
    // insert; unwind the quote rather than orphan it.
    match state.orders.get(&order_id) {
        Some(order) if order.status == OrderStatus::Searching => {}
        _ => {
            state.quotes.remove(&quote.id);
            return Err(AppError::PreconditionFailed(
                "order is no longer accepting quotes".to_string(),
            ));
        }
    }

    info!(order_id = %order_id, provider_id = %provider_id, price, "quote submitted");
    Ok(quote)
}

/// Accepts exactly one quote. The `SEARCHING -> ASSIGNED` transition is a
/// compare-and-swap; a concurrent acceptance loses with
/// `PreconditionFailed` rather than silently reassigning.
pub async fn accept_quote(
    state: Arc<AppState>,
    order_id: Uuid,
    quote_id: Uuid,
) -> Result<Order, AppError> {
    let quote = state
        .quotes
        .get(&quote_id)
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;
    if quote.order_id != order_id {
        return Err(AppError::BadRequest(
            "quote does not belong to this order".to_string(),
        ));
    }

    // Claim the quote first: the PENDING -> ACCEPTED flip is itself a
    // compare-and-swap, so a concurrent rejection loses here atomically.
    let quote = state
        .quotes
        .transition(&quote_id, &[QuoteStatus::Pending], |q| {
            q.status = QuoteStatus::Accepted;
        })?;

    let now = Utc::now();
    let order = match state
        .orders
        .transition(&order_id, &[OrderStatus::Searching], |order| {
            order.status = OrderStatus::Assigned;
            order.assigned_provider_id = Some(quote.provider_id);
            order.assigned_price = Some(quote.price);
            order.updated_at = now;
        }) {
        Ok(order) => order,
        Err(err) => {
            // Another quote won the order; release the claim.
            if let Err(rollback) = state
                .quotes
                .transition(&quote_id, &[QuoteStatus::Accepted], |q| {
                    q.status = QuoteStatus::Pending;
                })
            {
                warn!(quote_id = %quote_id, error = %rollback, "failed to release claimed quote");
            }
            return Err(err);
        }
    };

    if let Err(err) = state.directory.update(&quote.provider_id, |provider| {
        provider.current_active_jobs += 1;
        provider.updated_at = now;
    }) {
        warn!(provider_id = %quote.provider_id, error = %err, "failed to bump provider workload");
    }

    // Notification only; must never fail the acceptance.
    let channel = state
        .messaging
        .ensure_channel(order.requester_id, quote.provider_id);
    if let Err(err) = state.messaging.post_system_message(
        &channel,
        format!("Quote accepted at {:.2}. The order is now assigned.", quote.price),
    ) {
        warn!(order_id = %order_id, error = %err, "failed to post acceptance message");
    }

    info!(
        order_id = %order_id,
        provider_id = %quote.provider_id,
        price = quote.price,
        "quote accepted"
    );
    Ok(order)
}

/// Rejects a quote and spawns a best-effort replacement search. The
/// rejection is the primary, synchronous effect; the caller must not
/// assume a replacement is attached by the time this returns.
pub async fn reject_quote(
    state: Arc<AppState>,
    order_id: Uuid,
    quote_id: Uuid,
) -> Result<Quote, AppError> {
    let quote = state
        .quotes
        .get(&quote_id)
        .ok_or_else(|| AppError::NotFound(format!("quote {quote_id} not found")))?;
    if quote.order_id != order_id {
        return Err(AppError::BadRequest(
            "quote does not belong to this order".to_string(),
        ));
    }

    state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    // Single commit point for the rejection: loses atomically to a
    // concurrent acceptance instead of overwriting it.
    let quote = state
        .quotes
        .transition(&quote_id, &[QuoteStatus::Pending], |q| {
            q.status = QuoteStatus::Rejected;
        })?;
    state.orders.update(&order_id, |order| {
        order.rejected_provider_ids.insert(quote.provider_id);
        order.updated_at = Utc::now();
    })?;

    info!(order_id = %order_id, provider_id = %quote.provider_id, "quote rejected");

    let task_state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = run_replacement_search(task_state, order_id).await {
            warn!(order_id = %order_id, error = %err, "replacement search failed");
        }
    });

    Ok(quote)
}

/// Finds the next best provider for an order that lost a quote. Advisory:
/// it re-reads the order first and quietly does nothing unless the order
/// is still searching.
pub async fn run_replacement_search(
    state: Arc<AppState>,
    order_id: Uuid,
) -> Result<Option<Uuid>, AppError> {
    let Some(order) = state.orders.get(&order_id) else {
        return Ok(None);
    };
    if order.status != OrderStatus::Searching {
        state
            .metrics
            .replacement_searches_total
            .with_label_values(&["skipped"])
            .inc();
        return Ok(None);
    }

    let exclude: BTreeSet<Uuid> = order
        .contacted_provider_ids
        .union(&order.rejected_provider_ids)
        .copied()
        .collect();
    let shortlist = run_shortlist_search(
        &state,
        "replacement",
        &order.category,
        &order.location,
        &exclude,
    )
    .await;

    let Some(next) = shortlist.first().copied() else {
        state
            .metrics
            .replacement_searches_total
            .with_label_values(&["none"])
            .inc();
        info!(order_id = %order_id, "no replacement provider available");
        return Ok(None);
    };

    let now = Utc::now();
    match state
        .orders
        .transition(&order_id, &[OrderStatus::Searching], |order| {
            if order.contacted_provider_ids.insert(next) {
                order.targeted_providers.push(next);
            }
            order.updated_at = now;
        }) {
        Ok(_) => {
            state
                .metrics
                .replacement_searches_total
                .with_label_values(&["found"])
                .inc();
            info!(order_id = %order_id, provider_id = %next, "replacement provider attached");
            Ok(Some(next))
        }
        // The order moved on while we searched; drop the result.
        Err(AppError::PreconditionFailed(_)) | Err(AppError::NotFound(_)) => {
            state
                .metrics
                .replacement_searches_total
                .with_label_values(&["skipped"])
                .inc();
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// One manual widening to 2 km, available 30 minutes after creation while
/// no quote has been accepted.
pub async fn expand_radius(state: Arc<AppState>, order_id: Uuid) -> Result<Order, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::Searching {
        return Err(AppError::PreconditionFailed(
            "only searching orders can expand their radius".to_string(),
        ));
    }
    let elapsed = Utc::now() - order.created_at;
    if elapsed < chrono::Duration::minutes(EXPANSION_WAIT_MINUTES) {
        return Err(AppError::PreconditionFailed(format!(
            "radius expansion opens {EXPANSION_WAIT_MINUTES} minutes after creation"
        )));
    }
    if order.search_radius_km >= EXPANDED_RADIUS_KM {
        return Err(AppError::PreconditionFailed(
            "search radius already expanded".to_string(),
        ));
    }

    let exclude: BTreeSet<Uuid> = order
        .contacted_provider_ids
        .union(&order.rejected_provider_ids)
        .copied()
        .collect();
    let shortlist = run_shortlist_search(
        &state,
        "expansion",
        &order.category,
        &order.location,
        &exclude,
    )
    .await;

    let now = Utc::now();
    let order = state
        .orders
        .transition(&order_id, &[OrderStatus::Searching], |order| {
            for provider_id in &shortlist {
                if order.contacted_provider_ids.insert(*provider_id) {
                    order.targeted_providers.push(*provider_id);
                }
            }
            order.search_radius_km = EXPANDED_RADIUS_KM;
            order.updated_at = now;
        })?;

    info!(
        order_id = %order_id,
        added = shortlist.len(),
        "search radius expanded"
    );
    Ok(order)
}

/// The assigned provider asks the requester to confirm completion.
pub async fn request_closure(
    state: Arc<AppState>,
    order_id: Uuid,
    provider_id: Option<Uuid>,
) -> Result<Order, AppError> {
    if let Some(provider_id) = provider_id {
        let order = state
            .orders
            .get(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        if order.assigned_provider_id != Some(provider_id) {
            return Err(AppError::BadRequest(
                "only the assigned provider can request closure".to_string(),
            ));
        }
    }

    let now = Utc::now();
    let order = state
        .orders
        .transition(&order_id, &[OrderStatus::Assigned], |order| {
            order.status = OrderStatus::PendingClosure;
            order.updated_at = now;
        })?;

    info!(order_id = %order_id, "closure requested");
    Ok(order)
}

/// Deletes a searching order that never received a quote. No provider
/// side effects.
pub async fn cancel_order(state: Arc<AppState>, order_id: Uuid) -> Result<Order, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
    if order.status != OrderStatus::Searching {
        return Err(AppError::PreconditionFailed(
            "only searching orders can be cancelled".to_string(),
        ));
    }
    if state.quotes.count_for_order(&order_id) > 0 {
        return Err(AppError::PreconditionFailed(
            "orders with quotes cannot be cancelled".to_string(),
        ));
    }

    let Some(mut order) = state
        .orders
        .remove_if_status(&order_id, OrderStatus::Searching)
    else {
        return Err(AppError::PreconditionFailed(
            "order state changed during cancellation".to_string(),
        ));
    };

    // A quote may have slipped in between the check and the removal; put
    // the order back rather than orphan the quote.
    if state.quotes.count_for_order(&order_id) > 0 {
        state.orders.insert(order);
        return Err(AppError::PreconditionFailed(
            "orders with quotes cannot be cancelled".to_string(),
        ));
    }

    state.metrics.active_orders.dec();
    order.status = OrderStatus::Cancelled;
    info!(order_id = %order_id, "order cancelled");
    Ok(order)
}
