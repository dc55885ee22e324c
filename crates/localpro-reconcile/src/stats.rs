//! Counters accumulated over one reconciliation run.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::status::Gateway;

/// Per-gateway counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    /// Correlation ids whose provider status was requested.
    pub checked: u32,
    /// Records modified across all stores.
    pub updated: u64,
    /// Failed collections, fetches and store updates.
    pub errors: u32,
    /// The gateway has no credentials configured and was not synced.
    pub skipped: bool,
}

impl GatewayStats {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: IdOutcome) {
        self.checked += 1;
        self.updated += outcome.updated;
        self.errors += outcome.errors;
    }
}

/// Result of reconciling one correlation id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IdOutcome {
    pub updated: u64,
    pub errors: u32,
}

/// Aggregated result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration_ms: u64,
    pub paypal: GatewayStats,
    pub paymongo: GatewayStats,
}

impl RunStats {
    pub fn new(started_at: OffsetDateTime) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            paypal: GatewayStats::default(),
            paymongo: GatewayStats::default(),
        }
    }

    pub fn gateway(&self, gateway: Gateway) -> &GatewayStats {
        match gateway {
            Gateway::PayPal => &self.paypal,
            Gateway::PayMongo => &self.paymongo,
        }
    }

    pub fn gateway_mut(&mut self, gateway: Gateway) -> &mut GatewayStats {
        match gateway {
            Gateway::PayPal => &mut self.paypal,
            Gateway::PayMongo => &mut self.paymongo,
        }
    }

    pub fn total_checked(&self) -> u32 {
        self.paypal.checked + self.paymongo.checked
    }

    pub fn total_updated(&self) -> u64 {
        self.paypal.updated + self.paymongo.updated
    }

    pub fn total_errors(&self) -> u32 {
        self.paypal.errors + self.paymongo.errors
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }
}
