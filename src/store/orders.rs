use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{ArchivedOrder, Order, OrderStatus};

struct Versioned<T> {
    value: T,
    version: u64,
}

/// Active and archived order records. Every mutation of an active order
/// goes through this store and bumps the record's version, which is what
/// the archival transaction's conflict check keys on.
pub struct OrderStore {
    active: DashMap<Uuid, Versioned<Order>>,
    archived: DashMap<Uuid, ArchivedOrder>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            archived: DashMap::new(),
        }
    }

    pub fn insert(&self, order: Order) {
        self.active.insert(order.id, Versioned {
            value: order,
            version: 0,
        });
    }

    pub fn get(&self, id: &Uuid) -> Option<Order> {
        self.active.get(id).map(|entry| entry.value.clone())
    }

    pub fn get_versioned(&self, id: &Uuid) -> Option<(Order, u64)> {
        self.active
            .get(id)
            .map(|entry| (entry.value.clone(), entry.version))
    }

    pub fn list(&self) -> Vec<Order> {
        self.active
            .iter()
            .map(|entry| entry.value.clone())
            .collect()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Unconditional mutation, atomic per record.
    pub fn update<F>(&self, id: &Uuid, f: F) -> Result<Order, AppError>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self
            .active
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        f(&mut entry.value);
        entry.version += 1;
        Ok(entry.value.clone())
    }

    /// Compare-and-swap mutation: `f` only runs while the order is still in
    /// one of the `expected` states, checked under the record's lock.
    pub fn transition<F>(
        &self,
        id: &Uuid,
        expected: &[OrderStatus],
        f: F,
    ) -> Result<Order, AppError>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self
            .active
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if !expected.contains(&entry.value.status) {
            return Err(AppError::PreconditionFailed(format!(
                "order {id} is {}",
                entry.value.status
            )));
        }

        f(&mut entry.value);
        entry.version += 1;
        Ok(entry.value.clone())
    }

    /// Removes the record only if it was not mutated since `version` was
    /// observed. The archival transaction's commit point.
    pub fn remove_if_version(&self, id: &Uuid, version: u64) -> Option<Order> {
        self.active
            .remove_if(id, |_, entry| entry.version == version)
            .map(|(_, entry)| entry.value)
    }

    pub fn remove_if_status(&self, id: &Uuid, status: OrderStatus) -> Option<Order> {
        self.active
            .remove_if(id, |_, entry| entry.value.status == status)
            .map(|(_, entry)| entry.value)
    }

    pub fn insert_archived(&self, archived: ArchivedOrder) {
        self.archived.insert(archived.order.id, archived);
    }

    pub fn get_archived(&self, id: &Uuid) -> Option<ArchivedOrder> {
        self.archived.get(id).map(|entry| entry.value().clone())
    }

    pub fn archived_len(&self) -> usize {
        self.archived.len()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use uuid::Uuid;

    use super::OrderStore;
    use crate::error::AppError;
    use crate::models::order::{Order, OrderStatus};
    use crate::models::provider::GeoPoint;

    fn order(id_seed: u128) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::from_u128(id_seed),
            requester_id: Uuid::from_u128(1000),
            category: "Plumbing".to_string(),
            description: "leaking pipe".to_string(),
            priority: None,
            urgent: false,
            location: GeoPoint {
                lat: 48.8566,
                lng: 2.3522,
            },
            status: OrderStatus::Searching,
            images: Vec::new(),
            targeted_providers: Vec::new(),
            contacted_provider_ids: BTreeSet::new(),
            rejected_provider_ids: BTreeSet::new(),
            search_radius_km: 1.0,
            assigned_provider_id: None,
            assigned_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn transition_rejects_unexpected_status() {
        let store = OrderStore::new();
        let o = order(1);
        let id = o.id;
        store.insert(o);

        store
            .transition(&id, &[OrderStatus::Searching], |o| {
                o.status = OrderStatus::Assigned;
            })
            .unwrap();

        let err = store
            .transition(&id, &[OrderStatus::Searching], |o| {
                o.status = OrderStatus::Assigned;
            })
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[test]
    fn version_check_detects_concurrent_mutation() {
        let store = OrderStore::new();
        let o = order(2);
        let id = o.id;
        store.insert(o);

        let (_, version) = store.get_versioned(&id).unwrap();
        store
            .update(&id, |o| {
                o.search_radius_km = 2.0;
            })
            .unwrap();

        assert!(store.remove_if_version(&id, version).is_none());
        let (_, fresh) = store.get_versioned(&id).unwrap();
        assert!(store.remove_if_version(&id, fresh).is_some());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn remove_if_status_only_removes_matching_state() {
        let store = OrderStore::new();
        let o = order(3);
        let id = o.id;
        store.insert(o);

        assert!(store.remove_if_status(&id, OrderStatus::Assigned).is_none());
        assert!(store.get(&id).is_some());
        assert!(store
            .remove_if_status(&id, OrderStatus::Searching)
            .is_some());
    }
}
