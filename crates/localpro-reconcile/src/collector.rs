use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::RepositoryError;
use crate::repository::PaymentTargetRepository;
use crate::status::Gateway;

/// Gathers pending correlation ids for a gateway across all target stores.
pub struct CorrelationCollector {
    repositories: Vec<Arc<dyn PaymentTargetRepository>>,
    enabled: HashSet<Gateway>,
}

impl CorrelationCollector {
    pub fn new(
        repositories: Vec<Arc<dyn PaymentTargetRepository>>,
        enabled: impl IntoIterator<Item = Gateway>,
    ) -> Self {
        Self {
            repositories,
            enabled: enabled.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self, gateway: Gateway) -> bool {
        self.enabled.contains(&gateway)
    }

    /// Deduplicated, ordered correlation ids pending for `gateway`.
    ///
    /// Empty when the gateway has no credentials configured. Any store
    /// failing its query fails the whole collection for that gateway.
    pub async fn collect(&self, gateway: Gateway) -> Result<BTreeSet<String>, RepositoryError> {
        if !self.is_enabled(gateway) {
            return Ok(BTreeSet::new());
        }

        let mut ids = BTreeSet::new();
        for repository in &self.repositories {
            let found = repository.find_pending_correlation_ids(gateway).await?;
            debug!(
                gateway = %gateway,
                store = %repository.store(),
                count = found.len(),
                "Collected pending correlation ids"
            );
            ids.extend(found.into_iter().filter(|id| !id.trim().is_empty()));
        }

        Ok(ids)
    }
}
