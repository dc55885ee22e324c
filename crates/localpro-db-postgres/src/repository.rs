//! JSONB-backed target stores.
//!
//! Each store is one table of `(id, resource JSONB)` rows holding the
//! application's documents. Discovery and conditional updates address
//! fields through the shared [`TargetStore`] layout with `#>>` and
//! `jsonb_set`, so the pending check and the writes are one statement.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use localpro_reconcile::store::{FieldAssignment, FieldPath, PENDING};
use localpro_reconcile::{Gateway, PaymentTargetRepository, RepositoryError, StatusPatch, TargetStore};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;
use crate::pool::create_pool;

/// Path as a Postgres `text[]` parameter.
fn text_path(path: FieldPath) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

/// Path as a `text[]` literal for DDL, where parameters are not allowed.
fn path_literal(path: FieldPath) -> String {
    format!("'{{{}}}'", path.join(","))
}

/// `UPDATE` applying `assignments` to pending rows matching a correlation id.
///
/// Parameters: one `(path, value)` pair per assignment, then the status and
/// correlation paths each followed by their expected value. The payment
/// method only narrows discovery; the correlation path is already
/// gateway-specific.
fn update_statement(table: &str, assignments: &[FieldAssignment]) -> String {
    let mut expr = "resource".to_string();
    let mut param = 1;
    for _ in assignments {
        expr = format!("jsonb_set({expr}, ${param}, ${}, true)", param + 1);
        param += 2;
    }

    format!(
        "UPDATE {table} SET resource = {expr}, updated_at = NOW() \
         WHERE resource #>> ${} = ${} AND resource #>> ${} = ${}",
        param,
        param + 1,
        param + 2,
        param + 3,
    )
}

#[derive(Clone)]
pub struct PostgresTargetRepository {
    pool: PgPool,
    store: TargetStore,
    create_tables: bool,
    tables_created: Arc<DashSet<&'static str>>,
}

impl PostgresTargetRepository {
    pub fn new(pool: PgPool, store: TargetStore) -> Self {
        Self {
            pool,
            store,
            create_tables: true,
            tables_created: Arc::new(DashSet::new()),
        }
    }

    #[must_use]
    pub fn with_create_tables(mut self, create: bool) -> Self {
        self.create_tables = create;
        self
    }

    fn table(&self) -> &'static str {
        self.store.collection()
    }

    #[instrument(skip(self), fields(table = self.table()))]
    async fn ensure_table(&self) -> Result<()> {
        let table = self.table();
        if !self.create_tables || self.tables_created.contains(table) {
            return Ok(());
        }

        query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                resource JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ))
        .execute(&self.pool)
        .await?;

        query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_payment_status ON {table} ((resource #>> {}))",
            path_literal(self.store.status_path())
        ))
        .execute(&self.pool)
        .await?;

        info!(table, "Ensured payment target table");
        self.tables_created.insert(table);
        Ok(())
    }

    /// Insert or replace a document.
    pub async fn upsert(&self, id: &str, resource: &Value) -> Result<()> {
        self.ensure_table().await?;
        query(&format!(
            "INSERT INTO {} (id, resource) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET resource = EXCLUDED.resource, updated_at = NOW()",
            self.table()
        ))
        .bind(id)
        .bind(resource.clone())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Value>> {
        self.ensure_table().await?;
        let row: Option<(Value,)> =
            query_as(&format!("SELECT resource FROM {} WHERE id = $1", self.table()))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(resource,)| resource))
    }

    async fn pending_ids(&self, gateway: Gateway) -> Result<Vec<String>> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT DISTINCT resource #>> $1 FROM {} \
             WHERE resource #>> $2 = $3 AND resource #>> $4 = $5 \
             AND COALESCE(resource #>> $1, '') <> ''",
            self.table()
        );

        let rows: Vec<(String,)> = query_as(&sql)
            .bind(text_path(self.store.correlation_path(gateway)))
            .bind(text_path(self.store.method_path()))
            .bind(gateway.as_str())
            .bind(text_path(self.store.status_path()))
            .bind(PENDING)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn apply(&self, gateway: Gateway, correlation_id: &str, patch: &StatusPatch) -> Result<u64> {
        self.ensure_table().await?;
        let assignments = self.store.assignments(gateway, patch);
        let sql = update_statement(self.table(), &assignments);

        let mut statement = query(&sql);
        for assignment in &assignments {
            statement = statement
                .bind(text_path(assignment.path))
                .bind(assignment.value.clone());
        }
        let result = statement
            .bind(text_path(self.store.status_path()))
            .bind(PENDING)
            .bind(text_path(self.store.correlation_path(gateway)))
            .bind(correlation_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PaymentTargetRepository for PostgresTargetRepository {
    fn store(&self) -> TargetStore {
        self.store
    }

    #[instrument(skip(self), fields(store = %self.store))]
    async fn find_pending_correlation_ids(
        &self,
        gateway: Gateway,
    ) -> std::result::Result<Vec<String>, RepositoryError> {
        let ids = self.pending_ids(gateway).await?;
        debug!(count = ids.len(), "Found pending correlation ids");
        Ok(ids)
    }

    #[instrument(skip(self, patch), fields(store = %self.store))]
    async fn update_if_pending(
        &self,
        gateway: Gateway,
        correlation_id: &str,
        patch: &StatusPatch,
    ) -> std::result::Result<u64, RepositoryError> {
        Ok(self.apply(gateway, correlation_id, patch).await?)
    }
}

/// One repository per target store over a shared pool.
#[derive(Clone)]
pub struct PostgresStores {
    stores: Vec<PostgresTargetRepository>,
}

impl PostgresStores {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::from_pool(pool, config.create_tables))
    }

    pub fn from_pool(pool: PgPool, create_tables: bool) -> Self {
        let tables_created = Arc::new(DashSet::new());
        let stores = TargetStore::ALL
            .into_iter()
            .map(|store| PostgresTargetRepository {
                pool: pool.clone(),
                store,
                create_tables,
                tables_created: Arc::clone(&tables_created),
            })
            .collect();
        Self { stores }
    }

    pub fn get(&self, store: TargetStore) -> Option<&PostgresTargetRepository> {
        self.stores.iter().find(|repo| repo.store == store)
    }

    pub fn repositories(&self) -> Vec<Arc<dyn PaymentTargetRepository>> {
        self.stores
            .iter()
            .map(|repo| Arc::new(repo.clone()) as Arc<dyn PaymentTargetRepository>)
            .collect()
    }
}
