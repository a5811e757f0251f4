use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::filter::filter_candidates;
use crate::engine::scoring::score_candidate;
use crate::error::AppError;
use crate::models::candidate::ScoredCandidate;
use crate::models::provider::{GeoPoint, Provider};

/// Increasing search radii, walked in order until the shortlist target is
/// met. A later step is never issued once the target is reached.
pub const RADIUS_LADDER_KM: [f64; 6] = [1.0, 2.0, 4.0, 8.0, 15.0, 30.0];
pub const TARGET_CANDIDATES: usize = 10;

/// Raw geo-bounded provider lookup. Implemented by the provider directory;
/// tests substitute failing or counting sources.
#[async_trait]
pub trait GeoSource: Send + Sync {
    async fn providers_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Provider>, AppError>;
}

/// Walks the radius ladder and returns up to ten provider ids ranked by
/// composite score (ties broken by id, so results are deterministic).
///
/// A provider discovered at one radius joins the exclusion set immediately
/// and is never re-scored at a larger radius. A failed step is skipped; if
/// every attempted step fails the shortlist is empty, never an error. The
/// ladder also stops at the wall-clock deadline, returning the best
/// shortlist found so far.
pub async fn find_best_providers(
    source: &dyn GeoSource,
    category: &str,
    center: &GeoPoint,
    exclude: &BTreeSet<Uuid>,
    timeout: Duration,
) -> Vec<Uuid> {
    let deadline = Instant::now() + timeout;
    let mut exclude = exclude.clone();
    let mut found: HashMap<Uuid, ScoredCandidate> = HashMap::new();
    let mut attempted = 0u32;
    let mut failed = 0u32;

    for radius_km in RADIUS_LADDER_KM {
        if found.len() >= TARGET_CANDIDATES {
            break;
        }
        if Instant::now() >= deadline {
            warn!(
                category,
                radius_km, "search deadline reached; returning partial shortlist"
            );
            break;
        }

        attempted += 1;
        let raw = match source.providers_near(center, radius_km).await {
            Ok(raw) => raw,
            Err(err) => {
                failed += 1;
                warn!(category, radius_km, error = %err, "search step failed; skipping radius");
                continue;
            }
        };

        let accepted = filter_candidates(raw, category, center, radius_km * 1_000.0, &exclude);
        debug!(category, radius_km, accepted = accepted.len(), "search step done");

        for (provider, distance_km) in accepted {
            exclude.insert(provider.id);
            found.insert(provider.id, score_candidate(&provider, distance_km));
        }
    }

    if attempted > 0 && failed == attempted {
        warn!(category, "all search steps failed; returning empty shortlist");
        return Vec::new();
    }

    let mut ranked: Vec<ScoredCandidate> = found.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.provider_id.cmp(&b.provider_id))
    });
    ranked.truncate(TARGET_CANDIDATES);
    ranked.into_iter().map(|c| c.provider_id).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::{find_best_providers, GeoSource, TARGET_CANDIDATES};
    use crate::error::AppError;
    use crate::models::provider::{GeoPoint, Provider};

    const CENTER: GeoPoint = GeoPoint {
        lat: 48.8566,
        lng: 2.3522,
    };

    fn provider(id_seed: u128, rating: f64, lat_offset: f64) -> Provider {
        Provider {
            id: Uuid::from_u128(id_seed),
            name: format!("provider-{id_seed}"),
            category: "Plumbing".to_string(),
            available: true,
            rating,
            reviews_count: 0,
            jobs_done: 0,
            location: Some(GeoPoint {
                lat: CENTER.lat + lat_offset,
                lng: CENTER.lng,
            }),
            geohash: None,
            average_response_time_minutes: Some(10.0),
            current_active_jobs: 0,
            max_concurrent_jobs: 3,
            updated_at: Utc::now(),
        }
    }

    /// Serves a fixed provider set per radius and counts queries.
    struct FakeSource {
        near: Vec<Provider>,
        far: Vec<Provider>,
        calls: AtomicU32,
        fail_first_step: bool,
    }

    impl FakeSource {
        fn new(near: Vec<Provider>, far: Vec<Provider>) -> Self {
            Self {
                near,
                far,
                calls: AtomicU32::new(0),
                fail_first_step: false,
            }
        }
    }

    #[async_trait]
    impl GeoSource for FakeSource {
        async fn providers_near(
            &self,
            _center: &GeoPoint,
            radius_km: f64,
        ) -> Result<Vec<Provider>, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_step && call == 0 {
                return Err(AppError::Internal("directory unreachable".to_string()));
            }

            let mut result = self.near.clone();
            if radius_km >= 4.0 {
                result.extend(self.far.clone());
            }
            Ok(result)
        }
    }

    #[tokio::test]
    async fn stops_querying_once_target_is_met() {
        let near = (1..=TARGET_CANDIDATES as u128)
            .map(|seed| provider(seed, 4.0, 0.001))
            .collect();
        let source = FakeSource::new(near, Vec::new());

        let shortlist = find_best_providers(
            &source,
            "Plumbing",
            &CENTER,
            &BTreeSet::new(),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(shortlist.len(), TARGET_CANDIDATES);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_provider_appears_twice_across_radii() {
        // Two providers visible at every radius; the ladder runs all six
        // steps because the target is never met.
        let near = vec![provider(1, 4.5, 0.001), provider(2, 4.0, 0.002)];
        let source = FakeSource::new(near, Vec::new());

        let shortlist = find_best_providers(
            &source,
            "Plumbing",
            &CENTER,
            &BTreeSet::new(),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 6);
        assert_eq!(shortlist.len(), 2);
        let unique: BTreeSet<_> = shortlist.iter().collect();
        assert_eq!(unique.len(), shortlist.len());
    }

    #[tokio::test]
    async fn failed_step_is_skipped_not_fatal() {
        let mut source = FakeSource::new(vec![provider(1, 4.5, 0.001)], Vec::new());
        source.fail_first_step = true;

        let shortlist = find_best_providers(
            &source,
            "Plumbing",
            &CENTER,
            &BTreeSet::new(),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(shortlist, vec![Uuid::from_u128(1)]);
    }

    /// A source that always fails.
    struct BrokenSource;

    #[async_trait]
    impl GeoSource for BrokenSource {
        async fn providers_near(
            &self,
            _center: &GeoPoint,
            _radius_km: f64,
        ) -> Result<Vec<Provider>, AppError> {
            Err(AppError::Internal("directory unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn all_steps_failing_yields_empty_shortlist() {
        let shortlist = find_best_providers(
            &BrokenSource,
            "Plumbing",
            &CENTER,
            &BTreeSet::new(),
            Duration::from_secs(5),
        )
        .await;
        assert!(shortlist.is_empty());
    }

    #[tokio::test]
    async fn equal_scores_tie_break_by_id() {
        // Identical providers except for their ids.
        let near = vec![provider(9, 4.0, 0.001), provider(3, 4.0, 0.001)];
        let source = FakeSource::new(near, Vec::new());

        let shortlist = find_best_providers(
            &source,
            "Plumbing",
            &CENTER,
            &BTreeSet::new(),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(shortlist, vec![Uuid::from_u128(3), Uuid::from_u128(9)]);
    }

    #[tokio::test]
    async fn initial_exclusions_are_respected() {
        let near = vec![provider(1, 4.5, 0.001), provider(2, 4.0, 0.002)];
        let source = FakeSource::new(near, Vec::new());

        let exclude: BTreeSet<Uuid> = [Uuid::from_u128(1)].into_iter().collect();
        let shortlist =
            find_best_providers(&source, "Plumbing", &CENTER, &exclude, Duration::from_secs(5))
                .await;

        assert_eq!(shortlist, vec![Uuid::from_u128(2)]);
    }

    #[tokio::test]
    async fn expired_deadline_returns_best_so_far() {
        let near = vec![provider(1, 4.5, 0.001)];
        let source = FakeSource::new(near, Vec::new());

        let shortlist = find_best_providers(
            &source,
            "Plumbing",
            &CENTER,
            &BTreeSet::new(),
            Duration::from_millis(0),
        )
        .await;

        // Deadline elapsed before the first step: empty, but not an error.
        assert!(shortlist.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
