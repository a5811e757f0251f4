use std::collections::BTreeSet;

use uuid::Uuid;

use crate::geo::haversine_m;
use crate::models::provider::{GeoPoint, Provider};

/// Applies category, availability, exclusion and exact-distance checks to
/// raw geo-index results. Returns accepted providers with their distance
/// from the center in kilometers.
///
/// Category comparison is ASCII case-insensitive.
pub fn filter_candidates(
    raw: Vec<Provider>,
    category: &str,
    center: &GeoPoint,
    radius_m: f64,
    exclude: &BTreeSet<Uuid>,
) -> Vec<(Provider, f64)> {
    raw.into_iter()
        .filter_map(|provider| {
            if exclude.contains(&provider.id) {
                return None;
            }
            if !provider.category.eq_ignore_ascii_case(category) {
                return None;
            }
            if !provider.available {
                return None;
            }

            let location = provider.location?;
            if location.is_null_island() {
                return None;
            }

            let distance_m = haversine_m(center, &location);
            if distance_m > radius_m {
                return None;
            }

            Some((provider, distance_m / 1_000.0))
        })
        .collect()
}
