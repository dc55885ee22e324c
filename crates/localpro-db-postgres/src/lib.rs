//! PostgreSQL target stores for LocalPro payment reconciliation.
//!
//! ```ignore
//! use localpro_db_postgres::{PostgresConfig, PostgresStores};
//!
//! let stores = PostgresStores::connect(&PostgresConfig::new("postgres://localhost/localpro")).await?;
//! let engine = ReconciliationEngine::builder()
//!     .with_repositories(stores.repositories())
//!     .build();
//! ```

mod config;
mod error;
mod pool;
mod repository;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use pool::{PgPoolOptions, create_pool, mask_password};
pub use repository::{PostgresStores, PostgresTargetRepository};

pub use sqlx_postgres::PgPool;
