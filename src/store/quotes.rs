use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::quote::{Quote, QuoteStatus};

/// Quote records plus an index of open (non-rejected) quotes keyed by
/// `(order, provider)`. The index entry is the uniqueness claim: it is
/// taken atomically on insert and released when the quote is rejected or
/// unwound. Status changes go through the compare-and-swap `transition`.
pub struct QuoteStore {
    quotes: DashMap<Uuid, Quote>,
    open_by_pair: DashMap<(Uuid, Uuid), Uuid>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self {
            quotes: DashMap::new(),
            open_by_pair: DashMap::new(),
        }
    }

    /// Inserts a quote unless the provider already holds the open-quote
    /// claim on the same order. The claim is taken under the index
    /// entry's lock, so two simultaneous submissions cannot both land.
    pub fn insert_guarded(&self, quote: Quote) -> Result<Quote, AppError> {
        match self.open_by_pair.entry((quote.order_id, quote.provider_id)) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "provider {} already has an open quote on order {}",
                quote.provider_id, quote.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(quote.id);
                self.quotes.insert(quote.id, quote.clone());
                Ok(quote)
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Quote> {
        self.quotes.get(id).map(|entry| entry.value().clone())
    }

    pub fn list_for_order(&self, order_id: &Uuid) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self
            .quotes
            .iter()
            .filter(|entry| entry.order_id == *order_id)
            .map(|entry| entry.value().clone())
            .collect();
        quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        quotes
    }

    pub fn count_for_order(&self, order_id: &Uuid) -> usize {
        self.quotes
            .iter()
            .filter(|entry| entry.order_id == *order_id)
            .count()
    }

    /// Compare-and-swap status flip: `f` only runs while the quote still
    /// has one of the `expected` statuses, checked under the record's
    /// lock. Flipping to `Rejected` releases the open-quote claim.
    pub fn transition<F>(
        &self,
        id: &Uuid,
        expected: &[QuoteStatus],
        f: F,
    ) -> Result<Quote, AppError>
    where
        F: FnOnce(&mut Quote),
    {
        let updated = {
            let mut entry = self
                .quotes
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("quote {id} not found")))?;

            if !expected.contains(&entry.status) {
                return Err(AppError::PreconditionFailed(format!(
                    "quote {id} is {}",
                    entry.status
                )));
            }

            f(entry.value_mut());
            entry.value().clone()
        };

        if updated.status == QuoteStatus::Rejected {
            self.open_by_pair.remove_if(
                &(updated.order_id, updated.provider_id),
                |_, open| *open == updated.id,
            );
        }
        Ok(updated)
    }

    /// Unwinds a quote whose surrounding operation failed after the
    /// insert, releasing its claim.
    pub fn remove(&self, id: &Uuid) -> Option<Quote> {
        let (_, quote) = self.quotes.remove(id)?;
        self.open_by_pair.remove_if(
            &(quote.order_id, quote.provider_id),
            |_, open| *open == quote.id,
        );
        Some(quote)
    }
}

impl Default for QuoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::QuoteStore;
    use crate::error::AppError;
    use crate::models::quote::{Quote, QuoteStatus};

    fn quote(order_seed: u128, provider_seed: u128) -> Quote {
        Quote {
            id: Uuid::new_v4(),
            order_id: Uuid::from_u128(order_seed),
            provider_id: Uuid::from_u128(provider_seed),
            price: 120.0,
            description: "parts and labor".to_string(),
            status: QuoteStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn second_open_quote_from_same_provider_is_rejected() {
        let store = QuoteStore::new();
        store.insert_guarded(quote(1, 10)).unwrap();

        let err = store.insert_guarded(quote(1, 10)).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // A different provider on the same order is fine.
        store.insert_guarded(quote(1, 11)).unwrap();
        assert_eq!(store.count_for_order(&Uuid::from_u128(1)), 2);
    }

    #[test]
    fn rejected_quote_allows_a_fresh_one() {
        let store = QuoteStore::new();
        let first = store.insert_guarded(quote(2, 10)).unwrap();
        store
            .transition(&first.id, &[QuoteStatus::Pending], |q| {
                q.status = QuoteStatus::Rejected;
            })
            .unwrap();

        store.insert_guarded(quote(2, 10)).unwrap();
    }

    #[test]
    fn transition_rejects_unexpected_status() {
        let store = QuoteStore::new();
        let q = store.insert_guarded(quote(3, 10)).unwrap();
        store
            .transition(&q.id, &[QuoteStatus::Pending], |q| {
                q.status = QuoteStatus::Accepted;
            })
            .unwrap();

        let err = store
            .transition(&q.id, &[QuoteStatus::Pending], |q| {
                q.status = QuoteStatus::Rejected;
            })
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
        assert_eq!(store.get(&q.id).unwrap().status, QuoteStatus::Accepted);
    }

    #[test]
    fn accepted_quote_keeps_the_claim() {
        let store = QuoteStore::new();
        let q = store.insert_guarded(quote(4, 10)).unwrap();
        store
            .transition(&q.id, &[QuoteStatus::Pending], |q| {
                q.status = QuoteStatus::Accepted;
            })
            .unwrap();

        let err = store.insert_guarded(quote(4, 10)).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn removal_releases_the_claim() {
        let store = QuoteStore::new();
        let q = store.insert_guarded(quote(5, 10)).unwrap();
        assert!(store.remove(&q.id).is_some());
        assert_eq!(store.count_for_order(&Uuid::from_u128(5)), 0);

        store.insert_guarded(quote(5, 10)).unwrap();
    }
}
