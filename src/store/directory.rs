use std::collections::{BTreeMap, HashSet};
use std::ops::Bound::{Excluded, Included};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::search::GeoSource;
use crate::error::AppError;
use crate::geo::geohash;
use crate::models::provider::{GeoPoint, Provider};

/// Index precision. Fine enough that a cell is a few meters across; range
/// queries use shorter prefixes.
const GEOHASH_PRECISION: usize = 9;

/// Provider records plus an ordered geohash index for range scans.
///
/// The index is only a coarse pre-filter; exact distance is re-checked by
/// the candidate filter, so a briefly stale index entry is harmless.
pub struct ProviderDirectory {
    providers: DashMap<Uuid, Provider>,
    geo_index: RwLock<BTreeMap<(String, Uuid), ()>>,
}

impl ProviderDirectory {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
            geo_index: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, mut provider: Provider) -> Provider {
        provider.geohash = provider
            .location
            .map(|loc| geohash::encode(loc.lat, loc.lng, GEOHASH_PRECISION));

        if let Some(hash) = provider.geohash.clone() {
            self.geo_index
                .write()
                .expect("geo index lock poisoned")
                .insert((hash, provider.id), ());
        }

        self.providers.insert(provider.id, provider.clone());
        provider
    }

    pub fn get(&self, id: &Uuid) -> Option<Provider> {
        self.providers.get(id).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Provider> {
        self.providers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn update<F>(&self, id: &Uuid, f: F) -> Result<Provider, AppError>
    where
        F: FnOnce(&mut Provider),
    {
        let mut entry = self
            .providers
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("provider {id} not found")))?;

        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Exclusive handle on one provider record, for the archival
    /// transaction's read-compute-write sequence.
    pub fn lock_entry(&self, id: &Uuid) -> Option<RefMut<'_, Uuid, Provider>> {
        self.providers.get_mut(id)
    }

    pub fn set_availability(&self, id: &Uuid, available: bool) -> Result<Provider, AppError> {
        self.update(id, |provider| {
            provider.available = available;
            provider.updated_at = Utc::now();
        })
    }

    /// Moves a provider and reindexes its geohash. The entry lock is
    /// released before the index lock is taken, never held together.
    pub fn set_location(&self, id: &Uuid, location: GeoPoint) -> Result<Provider, AppError> {
        let new_hash = geohash::encode(location.lat, location.lng, GEOHASH_PRECISION);

        let (old_hash, updated) = {
            let mut entry = self
                .providers
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("provider {id} not found")))?;
            let old_hash = entry.geohash.clone();
            entry.location = Some(location);
            entry.geohash = Some(new_hash.clone());
            entry.updated_at = Utc::now();
            (old_hash, entry.value().clone())
        };

        let mut index = self.geo_index.write().expect("geo index lock poisoned");
        if let Some(old_hash) = old_hash {
            index.remove(&(old_hash, *id));
        }
        index.insert((new_hash, *id), ());

        Ok(updated)
    }

    fn ids_in_range(&self, start: &str, end: &str) -> Vec<Uuid> {
        let index = self.geo_index.read().expect("geo index lock poisoned");
        index
            .range((
                Included((start.to_string(), Uuid::nil())),
                Excluded((end.to_string(), Uuid::nil())),
            ))
            .map(|((_, id), ())| *id)
            .collect()
    }
}

impl Default for ProviderDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeoSource for ProviderDirectory {
    /// One ordered range scan per cover interval; the union is deduped by
    /// provider id. No filtering or ranking happens here.
    async fn providers_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Provider>, AppError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for (start, end) in geohash::cover(center, radius_km) {
            for id in self.ids_in_range(&start, &end) {
                if seen.insert(id) {
                    if let Some(provider) = self.get(&id) {
                        found.push(provider);
                    }
                }
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::ProviderDirectory;
    use crate::engine::search::GeoSource;
    use crate::models::provider::{GeoPoint, Provider};

    fn provider(id_seed: u128, lat: f64, lng: f64) -> Provider {
        Provider {
            id: Uuid::from_u128(id_seed),
            name: "test-provider".to_string(),
            category: "Plumbing".to_string(),
            available: true,
            rating: 4.0,
            reviews_count: 0,
            jobs_done: 0,
            location: Some(GeoPoint { lat, lng }),
            geohash: None,
            average_response_time_minutes: Some(20.0),
            current_active_jobs: 0,
            max_concurrent_jobs: 3,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn finds_nearby_provider_and_skips_distant_one() {
        let directory = ProviderDirectory::new();
        directory.insert(provider(1, 48.8566, 2.3522));
        directory.insert(provider(2, 48.86, 2.36)); // ~700 m away
        directory.insert(provider(3, 51.5074, -0.1278)); // London

        let center = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let found = directory.providers_near(&center, 2.0).await.unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id).collect();

        assert!(ids.contains(&Uuid::from_u128(1)));
        assert!(ids.contains(&Uuid::from_u128(2)));
        assert!(!ids.contains(&Uuid::from_u128(3)));
    }

    #[tokio::test]
    async fn relocation_moves_provider_between_queries() {
        let directory = ProviderDirectory::new();
        let inserted = directory.insert(provider(7, 51.5074, -0.1278));

        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let found = directory.providers_near(&paris, 2.0).await.unwrap();
        assert!(found.is_empty());

        directory
            .set_location(&inserted.id, GeoPoint {
                lat: 48.857,
                lng: 2.353,
            })
            .unwrap();

        let found = directory.providers_near(&paris, 2.0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inserted.id);
    }

    #[test]
    fn insert_without_location_is_not_indexed() {
        let directory = ProviderDirectory::new();
        let mut p = provider(9, 0.0, 0.0);
        p.location = None;
        let stored = directory.insert(p);
        assert!(stored.geohash.is_none());
    }
}
