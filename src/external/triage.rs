//! Urgent-intake triage. The engine only consumes the structured
//! classification; when the assistant is unavailable a fixed fallback is
//! substituted so order creation never blocks on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::order::Priority;

#[derive(Debug, Error)]
#[error("triage unavailable: {0}")]
pub struct TriageError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageClassification {
    pub category: String,
    pub priority: Priority,
    pub summary: String,
    pub safety_advice: String,
    pub estimated_price_range: String,
}

#[async_trait]
pub trait TriageAssistant: Send + Sync {
    async fn classify(
        &self,
        description: &str,
        image_count: usize,
    ) -> Result<TriageClassification, TriageError>;
}

/// Substituted whenever classification fails.
pub fn fallback_classification(description: &str) -> TriageClassification {
    let summary = if description.trim().is_empty() {
        "Urgent technical issue".to_string()
    } else {
        description.trim().to_string()
    };

    TriageClassification {
        category: "Multi-service".to_string(),
        priority: Priority::High,
        summary,
        safety_advice: "Cut the water and power supplies and keep clear until a professional \
                        arrives."
            .to_string(),
        estimated_price_range: "On quote".to_string(),
    }
}

/// Keyword-based stand-in for the hosted assistant. Good enough to route
/// the common emergencies; everything else falls back to multi-service.
#[derive(Debug, Default)]
pub struct HeuristicTriage;

const RULES: &[(&[&str], &str, Priority, &str, &str)] = &[
    (
        &["leak", "pipe", "flood", "water", "drain"],
        "Plumbing",
        Priority::High,
        "Shut off the main water valve and move valuables away from the water.",
        "80-250",
    ),
    (
        &["spark", "outlet", "power", "electric", "breaker", "wiring"],
        "Electrical",
        Priority::Critical,
        "Switch off the breaker and do not touch exposed wiring.",
        "100-300",
    ),
    (
        &["lock", "key", "door jammed", "locked out"],
        "Locksmith",
        Priority::High,
        "Stay with the door and do not force the lock.",
        "60-150",
    ),
    (
        &["heater", "boiler", "radiator", "heating"],
        "Heating",
        Priority::High,
        "Turn the system off and ventilate the room.",
        "120-350",
    ),
];

#[async_trait]
impl TriageAssistant for HeuristicTriage {
    async fn classify(
        &self,
        description: &str,
        _image_count: usize,
    ) -> Result<TriageClassification, TriageError> {
        let text = description.trim();
        if text.is_empty() {
            return Err(TriageError("empty description".to_string()));
        }

        let lowered = text.to_ascii_lowercase();
        for (keywords, category, priority, advice, price_range) in RULES {
            if keywords.iter().any(|kw| lowered.contains(kw)) {
                return Ok(TriageClassification {
                    category: (*category).to_string(),
                    priority: *priority,
                    summary: text.to_string(),
                    safety_advice: (*advice).to_string(),
                    estimated_price_range: (*price_range).to_string(),
                });
            }
        }

        Ok(fallback_classification(text))
    }
}

#[cfg(test)]
mod tests {
    use super::{fallback_classification, HeuristicTriage, TriageAssistant};
    use crate::models::order::Priority;

    #[tokio::test]
    async fn water_damage_routes_to_plumbing() {
        let result = HeuristicTriage
            .classify("Burst pipe, water everywhere in the kitchen", 2)
            .await
            .unwrap();

        assert_eq!(result.category, "Plumbing");
        assert_eq!(result.priority, Priority::High);
    }

    #[tokio::test]
    async fn electrical_hazards_are_critical() {
        let result = HeuristicTriage
            .classify("Sparks coming out of the wall outlet", 0)
            .await
            .unwrap();

        assert_eq!(result.category, "Electrical");
        assert_eq!(result.priority, Priority::Critical);
    }

    #[tokio::test]
    async fn unknown_problem_falls_back_to_multi_service() {
        let result = HeuristicTriage
            .classify("Something strange happened", 0)
            .await
            .unwrap();

        assert_eq!(result.category, "Multi-service");
        assert_eq!(result.estimated_price_range, "On quote");
    }

    #[test]
    fn fallback_has_fixed_shape() {
        let fallback = fallback_classification("");
        assert_eq!(fallback.category, "Multi-service");
        assert_eq!(fallback.priority, Priority::High);
        assert_eq!(fallback.estimated_price_range, "On quote");
        assert!(!fallback.safety_advice.is_empty());
    }
}
