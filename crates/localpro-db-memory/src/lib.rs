//! In-memory payment target stores.
//!
//! Each [`InMemoryTargetRepository`] holds the JSON documents of one domain
//! store in a concurrent map. The pending check and the field writes of a
//! conditional update happen while the entry's shard lock is held, so two
//! concurrent updates for the same record cannot both apply.
//!
//! ```ignore
//! use localpro_db_memory::MemoryStores;
//! use serde_json::json;
//!
//! let stores = MemoryStores::new();
//! stores.bookings.insert("b1", json!({
//!     "payment": { "method": "paypal", "status": "pending", "paypalOrderId": "ORDER123" }
//! }));
//! let engine = ReconciliationEngine::builder()
//!     .with_repositories(stores.repositories())
//!     .build();
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use localpro_reconcile::store::{self, PENDING};
use localpro_reconcile::{Gateway, PaymentTargetRepository, RepositoryError, StatusPatch, TargetStore};
use serde_json::Value;
use tracing::{debug, instrument};

/// Documents of one target store, keyed by record id.
#[derive(Debug, Clone)]
pub struct InMemoryTargetRepository {
    store: TargetStore,
    documents: Arc<DashMap<String, Value>>,
}

impl InMemoryTargetRepository {
    pub fn new(store: TargetStore) -> Self {
        Self {
            store,
            documents: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, id: impl Into<String>, document: Value) {
        self.documents.insert(id.into(), document);
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.documents.get(id).map(|doc| doc.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Value> {
        self.documents.remove(id).map(|(_, doc)| doc)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn is_pending(&self, document: &Value) -> bool {
        store::read_str(document, self.store.status_path()) == Some(PENDING)
    }

    fn is_pending_for(&self, document: &Value, gateway: Gateway) -> bool {
        store::read_str(document, self.store.method_path()) == Some(gateway.as_str())
            && self.is_pending(document)
    }
}

#[async_trait]
impl PaymentTargetRepository for InMemoryTargetRepository {
    fn store(&self) -> TargetStore {
        self.store
    }

    #[instrument(skip(self), fields(store = %self.store))]
    async fn find_pending_correlation_ids(
        &self,
        gateway: Gateway,
    ) -> Result<Vec<String>, RepositoryError> {
        let path = self.store.correlation_path(gateway);
        let ids: BTreeSet<String> = self
            .documents
            .iter()
            .filter(|entry| self.is_pending_for(entry.value(), gateway))
            .filter_map(|entry| store::read_str(entry.value(), path).map(str::to_string))
            .collect();

        debug!(count = ids.len(), "Found pending correlation ids");
        Ok(ids.into_iter().collect())
    }

    #[instrument(skip(self, patch), fields(store = %self.store))]
    async fn update_if_pending(
        &self,
        gateway: Gateway,
        correlation_id: &str,
        patch: &StatusPatch,
    ) -> Result<u64, RepositoryError> {
        let path = self.store.correlation_path(gateway);
        let assignments = self.store.assignments(gateway, patch);
        let mut modified = 0;

        for mut entry in self.documents.iter_mut() {
            if !self.is_pending(entry.value())
                || store::read_str(entry.value(), path) != Some(correlation_id)
            {
                continue;
            }

            // Writes go to a copy so a malformed document is left untouched.
            let mut updated = entry.value().clone();
            for assignment in &assignments {
                if !store::write_path(&mut updated, assignment.path, assignment.value.clone()) {
                    return Err(RepositoryError::Malformed {
                        id: entry.key().clone(),
                        message: format!(
                            "cannot write {}: parent is not an object",
                            store::pointer(assignment.path)
                        ),
                    });
                }
            }
            *entry.value_mut() = updated;
            modified += 1;
        }

        Ok(modified)
    }
}

/// One in-memory repository per target store.
#[derive(Debug, Clone)]
pub struct MemoryStores {
    pub bookings: InMemoryTargetRepository,
    pub supply_orders: InMemoryTargetRepository,
    pub transactions: InMemoryTargetRepository,
    pub subscription_payments: InMemoryTargetRepository,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            bookings: InMemoryTargetRepository::new(TargetStore::Booking),
            supply_orders: InMemoryTargetRepository::new(TargetStore::SupplyOrder),
            transactions: InMemoryTargetRepository::new(TargetStore::Transaction),
            subscription_payments: InMemoryTargetRepository::new(TargetStore::SubscriptionPayment),
        }
    }

    pub fn get(&self, store: TargetStore) -> &InMemoryTargetRepository {
        match store {
            TargetStore::Booking => &self.bookings,
            TargetStore::SupplyOrder => &self.supply_orders,
            TargetStore::Transaction => &self.transactions,
            TargetStore::SubscriptionPayment => &self.subscription_payments,
        }
    }

    /// Handles sharing these stores' documents, in `TargetStore::ALL` order.
    pub fn repositories(&self) -> Vec<Arc<dyn PaymentTargetRepository>> {
        TargetStore::ALL
            .into_iter()
            .map(|s| Arc::new(self.get(s).clone()) as Arc<dyn PaymentTargetRepository>)
            .collect()
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}
