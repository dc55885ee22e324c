//! Reconciliation orchestrator.
//!
//! Delivery contract: at-least-once and eventually consistent. Every run
//! rediscovers what is still pending, so a fetch or store update that fails
//! in one run is attempted again by the next one. Within a run, transient
//! gateway errors are only retried when `fetch_retries` is configured.
//! Updates are compare-and-set on the pending status, which makes repeated
//! or overlapping runs harmless for record state.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::join_all;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::collector::CorrelationCollector;
use crate::config::{PayMongoConfig, PayPalConfig, ReconcileConfig};
use crate::error::GatewayError;
use crate::gateways::{
    GatewayStatusFetcher, GatewayStatusResult, PayMongoClient, PayPalClient, ProviderPayment,
};
use crate::repository::{PaymentTargetRepository, StatusPatch};
use crate::stats::{GatewayStats, IdOutcome, RunStats};
use crate::status::Gateway;

/// Engine tuning taken from [`ReconcileConfig`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_concurrency: usize,
    pub fetch_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for EngineOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            fetch_retries: config.fetch_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only sync these gateways; `None` syncs every configured gateway.
    pub gateways: Option<Vec<Gateway>>,
    pub max_concurrency: Option<usize>,
}

impl RunOptions {
    pub fn only(gateway: Gateway) -> Self {
        Self {
            gateways: Some(vec![gateway]),
            ..Default::default()
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    fn includes(&self, gateway: Gateway) -> bool {
        self.gateways
            .as_ref()
            .is_none_or(|selected| selected.contains(&gateway))
    }
}

/// Drives collect → fetch → map → conditional update for every gateway.
pub struct ReconciliationEngine {
    repositories: Vec<Arc<dyn PaymentTargetRepository>>,
    fetchers: HashMap<Gateway, Arc<dyn GatewayStatusFetcher>>,
    collector: CorrelationCollector,
    options: EngineOptions,
}

impl ReconciliationEngine {
    pub fn builder() -> ReconciliationEngineBuilder {
        ReconciliationEngineBuilder::default()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Gateways with credentials, in sync order.
    pub fn configured_gateways(&self) -> Vec<Gateway> {
        Gateway::ALL
            .into_iter()
            .filter(|g| self.fetchers.contains_key(g))
            .collect()
    }

    /// Run one full reconciliation pass. Never fails; problems are logged
    /// and counted in the returned stats.
    pub async fn run_once(&self, options: &RunOptions) -> RunStats {
        let started = Instant::now();
        let mut stats = RunStats::new(OffsetDateTime::now_utc());
        let concurrency = options
            .max_concurrency
            .unwrap_or(self.options.max_concurrency)
            .max(1);

        info!(max_concurrency = concurrency, "Payment reconciliation run started");

        for gateway in Gateway::ALL {
            let fetcher = match self.fetchers.get(&gateway) {
                Some(fetcher) if options.includes(gateway) => fetcher,
                Some(_) => {
                    debug!(gateway = %gateway, "Gateway excluded from this run");
                    *stats.gateway_mut(gateway) = GatewayStats::skipped();
                    continue;
                }
                None => {
                    debug!(gateway = %gateway, "Gateway not configured, skipping sync");
                    *stats.gateway_mut(gateway) = GatewayStats::skipped();
                    continue;
                }
            };

            *stats.gateway_mut(gateway) =
                self.sync_gateway(gateway, fetcher.as_ref(), concurrency).await;
        }

        stats.finish(started.elapsed());
        info!(
            paypal_checked = stats.paypal.checked,
            paypal_updated = stats.paypal.updated,
            paypal_errors = stats.paypal.errors,
            paymongo_checked = stats.paymongo.checked,
            paymongo_updated = stats.paymongo.updated,
            paymongo_errors = stats.paymongo.errors,
            duration_ms = stats.duration_ms,
            "Payment reconciliation run finished"
        );
        stats
    }

    async fn sync_gateway(
        &self,
        gateway: Gateway,
        fetcher: &dyn GatewayStatusFetcher,
        concurrency: usize,
    ) -> GatewayStats {
        let mut stats = GatewayStats::default();

        let ids: Vec<String> = match self.collector.collect(gateway).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                error!(gateway = %gateway, error = %e, "Failed to collect pending payments");
                stats.errors += 1;
                return stats;
            }
        };

        if ids.is_empty() {
            debug!(gateway = %gateway, "No pending payments");
            return stats;
        }

        info!(gateway = %gateway, pending = ids.len(), "Reconciling pending payments");

        // Each chunk settles completely before the next starts, which caps
        // in-flight gateway calls at `concurrency`.
        for chunk in ids.chunks(concurrency) {
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|id| self.reconcile_isolated(gateway, fetcher, id)),
            )
            .await;

            for outcome in outcomes {
                stats.record(outcome);
            }
        }

        stats
    }

    async fn reconcile_isolated(
        &self,
        gateway: Gateway,
        fetcher: &dyn GatewayStatusFetcher,
        correlation_id: &str,
    ) -> IdOutcome {
        match AssertUnwindSafe(self.reconcile_one(gateway, fetcher, correlation_id))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    gateway = %gateway,
                    correlation_id,
                    "Reconciliation task panicked"
                );
                IdOutcome {
                    updated: 0,
                    errors: 1,
                }
            }
        }
    }

    async fn reconcile_one(
        &self,
        gateway: Gateway,
        fetcher: &dyn GatewayStatusFetcher,
        correlation_id: &str,
    ) -> IdOutcome {
        let payment = match self.fetch_with_retry(fetcher, correlation_id).await {
            Ok(payment) => payment,
            Err(e) => {
                warn!(
                    gateway = %gateway,
                    correlation_id,
                    error = %e,
                    "Failed to fetch payment status"
                );
                return IdOutcome {
                    updated: 0,
                    errors: 1,
                };
            }
        };

        let result = GatewayStatusResult::from_provider(gateway, correlation_id, payment);
        let Some(patch) = StatusPatch::from_result(&result, OffsetDateTime::now_utc()) else {
            debug!(
                gateway = %gateway,
                correlation_id,
                raw_status = %result.raw_status,
                "Payment still pending"
            );
            return IdOutcome::default();
        };

        self.apply(gateway, correlation_id, &patch).await
    }

    async fn fetch_with_retry(
        &self,
        fetcher: &dyn GatewayStatusFetcher,
        correlation_id: &str,
    ) -> Result<ProviderPayment, GatewayError> {
        let mut attempt = 0;
        loop {
            match fetcher.fetch_status(correlation_id).await {
                Ok(payment) => return Ok(payment),
                Err(e) if e.is_transient() && attempt < self.options.fetch_retries => {
                    let delay = self
                        .options
                        .retry_backoff
                        .saturating_mul(2_u32.saturating_pow(attempt));
                    debug!(
                        gateway = %fetcher.gateway(),
                        correlation_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying payment status fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Issue the conditional update to every store. A failing store does
    /// not prevent the others from being updated.
    async fn apply(&self, gateway: Gateway, correlation_id: &str, patch: &StatusPatch) -> IdOutcome {
        let mut outcome = IdOutcome::default();

        for repository in &self.repositories {
            match repository
                .update_if_pending(gateway, correlation_id, patch)
                .await
            {
                Ok(0) => {}
                Ok(modified) => {
                    info!(
                        gateway = %gateway,
                        correlation_id,
                        store = %repository.store(),
                        status = ?patch.status,
                        modified,
                        "Payment status reconciled"
                    );
                    outcome.updated += modified;
                }
                Err(e) => {
                    error!(
                        gateway = %gateway,
                        correlation_id,
                        store = %repository.store(),
                        error = %e,
                        "Failed to update payment record"
                    );
                    outcome.errors += 1;
                }
            }
        }

        outcome
    }
}

/// Builder for [`ReconciliationEngine`].
#[derive(Default)]
pub struct ReconciliationEngineBuilder {
    repositories: Vec<Arc<dyn PaymentTargetRepository>>,
    fetchers: HashMap<Gateway, Arc<dyn GatewayStatusFetcher>>,
    options: EngineOptions,
}

impl ReconciliationEngineBuilder {
    pub fn with_repository(mut self, repository: Arc<dyn PaymentTargetRepository>) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn with_repositories(
        mut self,
        repositories: impl IntoIterator<Item = Arc<dyn PaymentTargetRepository>>,
    ) -> Self {
        self.repositories.extend(repositories);
        self
    }

    /// Register the fetcher for its gateway, replacing any previous one.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn GatewayStatusFetcher>) -> Self {
        self.fetchers.insert(fetcher.gateway(), fetcher);
        self
    }

    /// Register HTTP clients for every gateway that has credentials.
    pub fn with_gateway_clients(
        mut self,
        paypal: &PayPalConfig,
        paymongo: &PayMongoConfig,
    ) -> Result<Self, GatewayError> {
        if let Some(client) = PayPalClient::from_config(paypal)? {
            self = self.with_fetcher(Arc::new(client));
        }
        if let Some(client) = PayMongoClient::from_config(paymongo)? {
            self = self.with_fetcher(Arc::new(client));
        }
        Ok(self)
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(self, config: &ReconcileConfig) -> Self {
        self.with_options(EngineOptions::from(config))
    }

    pub fn build(self) -> ReconciliationEngine {
        let collector = CorrelationCollector::new(
            self.repositories.clone(),
            self.fetchers.keys().copied(),
        );
        ReconciliationEngine {
            repositories: self.repositories,
            fetchers: self.fetchers,
            collector,
            options: self.options,
        }
    }
}
