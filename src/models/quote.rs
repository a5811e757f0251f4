use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Rejected,
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A priced proposal from a provider against an order. Quotes are never
/// deleted; rejection is a status flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_id: Uuid,
    pub price: f64,
    pub description: String,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
}
