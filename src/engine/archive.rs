//! Archival transaction: moves a finished order to the archive store,
//! records the review and recomputes the assigned provider's aggregate
//! statistics, all-or-nothing.
//!
//! Concurrency control is optimistic: the order's version is captured at
//! read time and checked again at the commit point (`remove_if_version`),
//! with the provider's record held exclusively across the commit. Every
//! fallible step happens before the first write, so a conflict or abort
//! leaves the order active and the provider untouched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{ArchivedOrder, Order, OrderStatus};
use crate::models::review::Review;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub rating: f64,
    pub comment: String,
    pub images: Vec<String>,
}

pub async fn archive_order(
    state: Arc<AppState>,
    order_id: Uuid,
    review: Option<ReviewInput>,
) -> Result<ArchivedOrder, AppError> {
    if let Some(review) = &review {
        if !(1.0..=5.0).contains(&review.rating) {
            return Err(AppError::BadRequest(
                "review rating must be between 1 and 5".to_string(),
            ));
        }
    }

    for attempt in 1..=state.archive_max_attempts {
        let (order, version) = state
            .orders
            .get_versioned(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if !matches!(
            order.status,
            OrderStatus::Assigned | OrderStatus::PendingClosure
        ) {
            return Err(AppError::PreconditionFailed(format!(
                "order {order_id} is {}",
                order.status
            )));
        }
        let provider_id = order.assigned_provider_id.ok_or_else(|| {
            AppError::Internal(format!("assigned order {order_id} has no provider"))
        })?;

        // Exclusive hold on the provider record for the whole commit.
        let Some(mut provider) = state.directory.lock_entry(&provider_id) else {
            return Err(AppError::NotFound(format!(
                "provider {provider_id} not found"
            )));
        };

        let (new_rating, new_count) = match &review {
            Some(review) => {
                let count = provider.reviews_count + 1;
                let rating = (provider.rating * f64::from(provider.reviews_count)
                    + review.rating)
                    / f64::from(count);
                (round_two_decimals(rating), count)
            }
            None => (provider.rating, provider.reviews_count),
        };

        // Commit point: fails if anything touched the order since the read.
        let Some(order) = state.orders.remove_if_version(&order_id, version) else {
            drop(provider);
            warn!(order_id = %order_id, attempt, "archival lost a race; retrying");
            continue;
        };

        // Committed. Everything below is infallible in-memory bookkeeping.
        let now = Utc::now();
        provider.rating = new_rating;
        provider.reviews_count = new_count;
        provider.jobs_done += 1;
        provider.current_active_jobs = provider.current_active_jobs.saturating_sub(1);
        provider.updated_at = now;
        drop(provider);

        let review_record = review.map(|review| Review {
            id: Uuid::new_v4(),
            order_id,
            provider_id,
            requester_id: order.requester_id,
            rating: review.rating,
            comment: review.comment,
            images: review.images,
            created_at: now,
        });
        if let Some(record) = &review_record {
            state.reviews.insert(record.id, record.clone());
        }

        let archived = ArchivedOrder {
            result_images: review_record
                .as_ref()
                .map(|r| r.images.clone())
                .unwrap_or_default(),
            review_id: review_record.as_ref().map(|r| r.id),
            completed_at: now,
            archived_at: now,
            order: Order {
                status: OrderStatus::Archived,
                updated_at: now,
                ..order
            },
        };
        state.orders.insert_archived(archived.clone());

        state.metrics.active_orders.dec();
        state
            .metrics
            .archives_total
            .with_label_values(&["success"])
            .inc();

        // Notification only; never part of the transaction.
        let channel = state
            .messaging
            .ensure_channel(archived.order.requester_id, provider_id);
        let note = match archived.review_id {
            Some(_) => "Order completed and archived; thanks for the review.".to_string(),
            None => "Order completed and archived.".to_string(),
        };
        if let Err(err) = state.messaging.post_system_message(&channel, note) {
            warn!(order_id = %order_id, error = %err, "failed to post completion message");
        }

        info!(
            order_id = %order_id,
            provider_id = %provider_id,
            rating = new_rating,
            attempt,
            "order archived"
        );
        return Ok(archived);
    }

    state
        .metrics
        .archives_total
        .with_label_values(&["conflict"])
        .inc();
    Err(AppError::TransactionConflict(format!(
        "archival of order {order_id} kept losing races; order is still active"
    )))
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
