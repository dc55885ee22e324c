//! Pull-based payment status reconciliation for LocalPro.
//!
//! Records in four domain stores (bookings, supply orders, finance
//! transactions, subscription payments) can stay `pending` when a provider
//! webhook is lost. The [`ReconciliationEngine`] periodically asks PayPal and
//! PayMongo for the authoritative status of every pending correlation id and
//! converges the stores with idempotent conditional updates.
//!
//! Storage substrates implement [`PaymentTargetRepository`]; see the
//! `localpro-db-memory` and `localpro-db-postgres` crates.

pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateways;
pub mod repository;
pub mod scheduler;
pub mod stats;
pub mod status;
pub mod store;

pub use collector::CorrelationCollector;
pub use config::{PayMongoConfig, PayPalConfig, PayPalMode, ReconcileConfig};
pub use engine::{EngineOptions, ReconciliationEngine, ReconciliationEngineBuilder, RunOptions};
pub use error::{GatewayError, RepositoryError, ScheduleError};
pub use gateways::{
    GatewayStatusFetcher, GatewayStatusResult, PayMongoClient, PayPalClient, ProviderPayment,
};
pub use repository::{PaymentTargetRepository, StatusPatch};
pub use scheduler::{ReconciliationScheduler, Schedule};
pub use stats::{GatewayStats, RunStats};
pub use status::{CanonicalStatus, Gateway, SettledStatus, map_status};
pub use store::TargetStore;
