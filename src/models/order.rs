use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::provider::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Waiting for quotes; the shortlist may still grow.
    Searching,
    /// Exactly one quote was accepted.
    Assigned,
    /// The assigned provider requested closure; awaiting confirmation.
    PendingClosure,
    /// Terminal. Only ever set on the archived copy.
    Archived,
    /// Terminal. Only ever set on the copy returned from a cancellation;
    /// the active record itself is deleted.
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Searching => "searching",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PendingClosure => "pending closure",
            OrderStatus::Archived => "archived",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub category: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub urgent: bool,
    pub location: GeoPoint,
    pub status: OrderStatus,
    pub images: Vec<String>,
    /// Shortlisted providers in discovery order.
    pub targeted_providers: Vec<Uuid>,
    /// Every provider ever shortlisted or appended. Grows monotonically.
    pub contacted_provider_ids: BTreeSet<Uuid>,
    /// Providers whose quotes were rejected. Grows monotonically.
    pub rejected_provider_ids: BTreeSet<Uuid>,
    pub search_radius_km: f64,
    pub assigned_provider_id: Option<Uuid>,
    pub assigned_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal copy of an order. Active and archived records are mutually
/// exclusive: archiving writes this and deletes the active record in the
/// same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub completed_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    pub review_id: Option<Uuid>,
    pub result_images: Vec<String>,
}
