use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response time assumed for providers that have never been measured.
/// Deliberately high: it zeroes the reactivity sub-score, so providers
/// with no data rank below measured ones.
pub const DEFAULT_RESPONSE_TIME_MINUTES: f64 = 60.0;
pub const DEFAULT_MAX_CONCURRENT_JOBS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// `(0, 0)` is the "null island" sentinel for an unset location and
    /// must never be treated as a real position.
    pub fn is_null_island(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub available: bool,
    pub rating: f64,
    pub reviews_count: u32,
    pub jobs_done: u32,
    pub location: Option<GeoPoint>,
    /// Geohash of `location`, maintained by the directory on every
    /// location write. `None` while the location is unset.
    pub geohash: Option<String>,
    pub average_response_time_minutes: Option<f64>,
    pub current_active_jobs: u32,
    pub max_concurrent_jobs: u32,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn response_time_minutes(&self) -> f64 {
        self.average_response_time_minutes
            .unwrap_or(DEFAULT_RESPONSE_TIME_MINUTES)
    }

    pub fn has_spare_capacity(&self) -> bool {
        self.current_active_jobs < self.max_concurrent_jobs
    }
}
