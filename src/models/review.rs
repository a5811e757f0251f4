use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Written exactly once, inside the archival transaction, and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_id: Uuid,
    pub requester_id: Uuid,
    pub rating: f64,
    pub comment: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}
