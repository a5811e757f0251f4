use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub rating_score: f64,
    pub reactivity_score: f64,
    pub workload_score: f64,
}

/// A provider decorated with its ranking for one search invocation.
/// Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub provider_id: Uuid,
    pub distance_km: f64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}
