//! SQL-backed lock store (MySQL/PostgreSQL via SeaORM)
//!
//! Locks are rows in a single table whose primary key is the lock key, so
//! the database's uniqueness enforcement is the mutual-exclusion mechanism:
//! of two concurrent inserts for the same key, exactly one succeeds. Expiry
//! is a predicate evaluated at read time; an expired row keeps occupying
//! its slot until the next acquisition attempt for that key displaces it
//! with a conditional update. There is no sweeper and no queueing.

pub(crate) mod schema;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{
    Alias, DeleteStatement, Expr, InsertStatement, Query, SelectStatement, SimpleExpr,
    UpdateStatement, Value,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr,
    FromQueryResult, SqlErr,
};
use tokio::sync::OnceCell;

use crate::error::{LockError, Result};
use crate::model::LockRow;
use crate::traits::LockStore;
use schema::LockColumn;

/// Configuration for [`DatabaseLockStore`]
///
/// The database dialect travels in the connection URL scheme
/// (`mysql://...` or `postgres://...`); the options only shape the pool
/// and the table.
#[derive(Clone, Debug)]
pub struct DatabaseStoreOptions {
    /// Name of the lock table, created on first use if absent
    pub table_name: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub sqlx_logging: bool,
}

impl Default for DatabaseStoreOptions {
    fn default() -> Self {
        Self {
            table_name: schema::DEFAULT_TABLE_NAME.to_string(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            sqlx_logging: false,
        }
    }
}

/// Lock store backed by a relational database
///
/// Holds the one connection handle for its lifetime; [`LockStore::disconnect`]
/// releases it. The lock table is bootstrapped once, lazily, and every
/// protocol operation awaits that bootstrap before touching the table.
pub struct DatabaseLockStore {
    db: DatabaseConnection,
    table_name: String,
    schema_ready: OnceCell<()>,
}

impl DatabaseLockStore {
    /// Connect to the database at `url` and wrap it in a lock store
    pub async fn connect(url: &str, options: DatabaseStoreOptions) -> Result<Self> {
        let mut opt = ConnectOptions::new(url);
        opt.max_connections(options.max_connections)
            .connect_timeout(options.connect_timeout)
            .sqlx_logging(options.sqlx_logging);

        tracing::info!(
            table = %options.table_name,
            max_connections = options.max_connections,
            "database lock store connecting"
        );

        let db = Database::connect(opt).await?;
        Ok(Self::with_connection(db, options))
    }

    /// Wrap an already-connected database handle
    pub fn with_connection(db: DatabaseConnection, options: DatabaseStoreOptions) -> Self {
        Self {
            db,
            table_name: options.table_name,
            schema_ready: OnceCell::new(),
        }
    }

    /// Await the one-time table bootstrap.
    ///
    /// Memoized: the statement runs once per store; a failure is returned
    /// to this caller and retried by the next one instead of leaving the
    /// store permanently wedged.
    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| schema::create_table_if_not_exists(&self.db, &self.table_name))
            .await?;
        Ok(())
    }

    /// Read the current row for `key`, live or not
    async fn find_row(&self, key: &str) -> Result<Option<LockRow>> {
        let stmt = select_statement(&self.table_name, key);
        let row = self.db.query_one(self.backend().build(&stmt)).await?;
        row.map(|row| LockRow::from_query_result(&row, ""))
            .transpose()
            .map_err(Into::into)
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }
}

#[async_trait]
impl LockStore for DatabaseLockStore {
    /// Acquire `key` for `owner`.
    ///
    /// Happy path is a single unconditional insert; the primary-key
    /// constraint rejects it when the key is already held. In that case an
    /// expired holder can still be displaced with a conditional update
    /// whose `expiration <= now` filter is the store-level compare-and-swap.
    async fn save(&self, key: &str, owner: &str, ttl: Option<Duration>) -> Result<bool> {
        self.ensure_schema().await?;
        let expiration = expires_at(ttl);

        let insert = insert_statement(&self.table_name, key, owner, expiration);
        let err = match self.db.execute(self.backend().build(&insert)).await {
            Ok(_) => {
                tracing::debug!(key = key, owner = owner, "lock acquired");
                return Ok(true);
            }
            Err(err) => err,
        };

        // Only a duplicate key falls through to the steal branch. Anything
        // else is a real storage failure and must not read as "lock held".
        if !is_unique_violation(&err) {
            return Err(err.into());
        }

        // The IS NOT NULL guard keeps permanent locks unstealable.
        let steal = steal_statement(&self.table_name, key, owner, expiration, now_ms());
        let result = self.db.execute(self.backend().build(&steal)).await?;
        let stolen = result.rows_affected() >= 1;
        if stolen {
            tracing::debug!(key = key, owner = owner, "expired lock stolen");
        }
        Ok(stolen)
    }

    /// Release the lock on `key` held by `owner`.
    ///
    /// The stored owner is checked regardless of liveness: the original
    /// holder may still clean up an expired row. The delete re-filters by
    /// owner at the statement level in case the lock changed hands between
    /// the read and the delete.
    async fn delete(&self, key: &str, owner: &str) -> Result<()> {
        self.ensure_schema().await?;

        match self.find_row(key).await? {
            Some(row) if row.owner == owner => {}
            _ => {
                return Err(LockError::ReleaseNotOwned {
                    key: key.to_string(),
                    owner: owner.to_string(),
                });
            }
        }

        let delete = delete_statement(&self.table_name, key, owner);
        let result = self.db.execute(self.backend().build(&delete)).await?;
        if result.rows_affected() == 0 {
            tracing::warn!(
                key = key,
                owner = owner,
                "lock changed hands before release completed"
            );
        }
        Ok(())
    }

    /// Whether a live lock is held for `key`. Never mutates the table.
    async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_schema().await?;
        Ok(self
            .find_row(key)
            .await?
            .is_some_and(|row| row.is_live(now_ms())))
    }

    async fn extend(&self, _key: &str, _ttl: Option<Duration>) -> Result<()> {
        Err(LockError::Unimplemented("extend"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.db.close_by_ref().await?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiration instant for a TTL; `None` (or zero) never expires
fn expires_at(ttl: Option<Duration>) -> Option<i64> {
    match ttl {
        Some(ttl) if !ttl.is_zero() => Some(now_ms() + ttl.as_millis() as i64),
        _ => None,
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn insert_statement(
    table_name: &str,
    key: &str,
    owner: &str,
    expiration: Option<i64>,
) -> InsertStatement {
    Query::insert()
        .into_table(Alias::new(table_name))
        .columns([LockColumn::Key, LockColumn::Owner, LockColumn::Expiration])
        .values_panic([
            SimpleExpr::from(Value::from(key)),
            SimpleExpr::from(Value::from(owner)),
            SimpleExpr::from(Value::from(expiration)),
        ])
        .to_owned()
}

fn steal_statement(
    table_name: &str,
    key: &str,
    owner: &str,
    expiration: Option<i64>,
    now_ms: i64,
) -> UpdateStatement {
    Query::update()
        .table(Alias::new(table_name))
        .value(LockColumn::Owner, owner)
        .value(LockColumn::Expiration, expiration)
        .and_where(Expr::col(LockColumn::Key).eq(key))
        .and_where(Expr::col(LockColumn::Expiration).is_not_null())
        .and_where(Expr::col(LockColumn::Expiration).lte(now_ms))
        .to_owned()
}

fn select_statement(table_name: &str, key: &str) -> SelectStatement {
    Query::select()
        .columns([LockColumn::Key, LockColumn::Owner, LockColumn::Expiration])
        .from(Alias::new(table_name))
        .and_where(Expr::col(LockColumn::Key).eq(key))
        .to_owned()
}

fn delete_statement(table_name: &str, key: &str, owner: &str) -> DeleteStatement {
    Query::delete()
        .from_table(Alias::new(table_name))
        .and_where(Expr::col(LockColumn::Key).eq(key))
        .and_where(Expr::col(LockColumn::Owner).eq(owner))
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter};

    #[test]
    fn test_expires_at_none_and_zero_mean_no_expiration() {
        assert_eq!(expires_at(None), None);
        assert_eq!(expires_at(Some(Duration::ZERO)), None);
    }

    #[test]
    fn test_expires_at_adds_ttl_to_now() {
        let before = now_ms();
        let expiration = expires_at(Some(Duration::from_secs(5))).unwrap();
        let after = now_ms();
        assert!(expiration >= before + 5_000);
        assert!(expiration <= after + 5_000);
    }

    #[test]
    fn test_non_constraint_errors_are_not_duplicate_keys() {
        let err = DbErr::Custom("connection reset".to_string());
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn test_insert_statement_shape() {
        let sql =
            insert_statement("verrou", "job:42", "worker-1", Some(1_000)).to_string(MysqlQueryBuilder);
        assert!(sql.contains("INSERT INTO `verrou`"));
        assert!(sql.contains("`key`"));
        assert!(sql.contains("`owner`"));
        assert!(sql.contains("`expiration`"));
        assert!(sql.contains("'job:42'"));
        assert!(sql.contains("1000"));
    }

    #[test]
    fn test_steal_statement_only_touches_expired_rows() {
        let sql = steal_statement("verrou", "job:42", "worker-2", Some(9_000), 5_000)
            .to_string(MysqlQueryBuilder);
        assert!(sql.contains("UPDATE `verrou`"));
        assert!(sql.contains("`expiration` IS NOT NULL"));
        assert!(sql.contains("`expiration` <= 5000"));
        assert!(sql.contains("`key` = 'job:42'"));
    }

    #[test]
    fn test_delete_statement_filters_by_key_and_owner() {
        let sql = delete_statement("verrou", "job:42", "worker-1").to_string(PostgresQueryBuilder);
        assert!(sql.contains("DELETE FROM \"verrou\""));
        assert!(sql.contains("\"key\" = 'job:42'"));
        assert!(sql.contains("\"owner\" = 'worker-1'"));
    }

    #[test]
    fn test_select_statement_reads_single_key() {
        let sql = select_statement("app_locks", "job:42").to_string(PostgresQueryBuilder);
        assert!(sql.contains("FROM \"app_locks\""));
        assert!(sql.contains("\"key\" = 'job:42'"));
    }

    #[tokio::test]
    async fn test_extend_is_unimplemented() {
        let store = DatabaseLockStore::with_connection(
            DatabaseConnection::default(),
            DatabaseStoreOptions::default(),
        );
        let err = store
            .extend("job:42", Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Unimplemented("extend")));
    }

    #[test]
    fn test_default_options_use_verrou_table() {
        let options = DatabaseStoreOptions::default();
        assert_eq!(options.table_name, "verrou");
    }
}
