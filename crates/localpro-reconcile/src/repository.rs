use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::RepositoryError;
use crate::gateways::GatewayStatusResult;
use crate::status::{Gateway, SettledStatus};
use crate::store::TargetStore;

/// Settled status and settlement details applied to pending records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPatch {
    pub status: SettledStatus,
    pub raw_status: String,
    pub settlement_id: Option<String>,
    pub settled_at: Option<OffsetDateTime>,
    pub processed_at: OffsetDateTime,
}

impl StatusPatch {
    /// Patch for a provider result; `None` while the payment is still pending.
    pub fn from_result(result: &GatewayStatusResult, processed_at: OffsetDateTime) -> Option<Self> {
        let status = result.status.settled()?;
        Some(Self {
            status,
            raw_status: result.raw_status.clone(),
            settlement_id: result.settlement_id.clone(),
            settled_at: result.settled_at,
            processed_at,
        })
    }

    /// Provider settlement time, falling back to when the patch was built.
    pub fn settled_at(&self) -> OffsetDateTime {
        self.settled_at.unwrap_or(self.processed_at)
    }
}

/// Port to one payment-bearing domain store.
///
/// `update_if_pending` is a compare-and-set: it only touches records whose
/// status is still pending, so applying the same patch again modifies
/// nothing. That filter is the only concurrency control between runs.
#[async_trait]
pub trait PaymentTargetRepository: Send + Sync {
    fn store(&self) -> TargetStore;

    /// Distinct correlation ids of pending records paid through `gateway`.
    async fn find_pending_correlation_ids(
        &self,
        gateway: Gateway,
    ) -> Result<Vec<String>, RepositoryError>;

    /// Apply `patch` to every pending record referencing `correlation_id`.
    /// Returns the number of records modified.
    async fn update_if_pending(
        &self,
        gateway: Gateway,
        correlation_id: &str,
        patch: &StatusPatch,
    ) -> Result<u64, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::ProviderPayment;
    use time::macros::datetime;

    #[test]
    fn test_no_patch_for_pending_result() {
        let result = GatewayStatusResult::from_provider(
            Gateway::PayMongo,
            "pi_1",
            ProviderPayment::new("processing"),
        );
        assert!(StatusPatch::from_result(&result, OffsetDateTime::now_utc()).is_none());
    }

    #[test]
    fn test_settled_at_falls_back_to_processed_at() {
        let processed = datetime!(2024-05-01 11:00 UTC);
        let result = GatewayStatusResult::from_provider(
            Gateway::PayPal,
            "ORDER1",
            ProviderPayment::new("VOIDED"),
        );
        let patch = StatusPatch::from_result(&result, processed).unwrap();

        assert_eq!(patch.status, SettledStatus::Failed);
        assert_eq!(patch.settled_at(), processed);
    }
}
