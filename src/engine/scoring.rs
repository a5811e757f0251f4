use crate::models::candidate::{ScoreBreakdown, ScoredCandidate};
use crate::models::provider::Provider;

// Weights sum to 1.0, keeping the composite on the same 0-100 scale as
// the sub-scores.
const DISTANCE_WEIGHT: f64 = 0.40;
const RATING_WEIGHT: f64 = 0.30;
const REACTIVITY_WEIGHT: f64 = 0.20;
const WORKLOAD_WEIGHT: f64 = 0.10;

/// Deterministic 0-100 ranking score for one provider at a known distance.
pub fn score_candidate(provider: &Provider, distance_km: f64) -> ScoredCandidate {
    let breakdown = ScoreBreakdown {
        distance_score: distance_score(distance_km),
        rating_score: rating_score(provider.rating),
        reactivity_score: reactivity_score(provider.response_time_minutes()),
        workload_score: workload_score(provider),
    };

    ScoredCandidate {
        provider_id: provider.id,
        distance_km,
        score: round_one_decimal(weighted_score(&breakdown)),
        breakdown,
    }
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.distance_score * DISTANCE_WEIGHT)
        + (breakdown.rating_score * RATING_WEIGHT)
        + (breakdown.reactivity_score * REACTIVITY_WEIGHT)
        + (breakdown.workload_score * WORKLOAD_WEIGHT)
}

/// 100 points at the doorstep, minus 10 per kilometer.
fn distance_score(distance_km: f64) -> f64 {
    (100.0 - 10.0 * distance_km).clamp(0.0, 100.0)
}

fn rating_score(rating: f64) -> f64 {
    (rating / 5.0 * 100.0).clamp(0.0, 100.0)
}

/// 100 points for instant responders, minus 2 per minute. Providers with
/// no measurement default to 60 minutes and land on 0 here.
fn reactivity_score(response_minutes: f64) -> f64 {
    (100.0 - 2.0 * response_minutes).clamp(0.0, 100.0)
}

fn workload_score(provider: &Provider) -> f64 {
    if provider.has_spare_capacity() {
        100.0
    } else {
        30.0
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
