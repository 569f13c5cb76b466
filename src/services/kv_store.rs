// Owner-scoped key-value API over the shared table
use std::sync::Arc;

use chrono::Utc;

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::{Backend, ConnectionLease, Driver};
use crate::services::row_decoder::RowDecoder;
use crate::services::shared_table::{create_table_sql, KeyOnlyRow, ValueRow};

/// Key-value operations confined to one owner's namespace
#[async_trait::async_trait]
pub trait KvApi: Send + Sync {
    /// Owner whose namespace this API operates on
    fn owner_id(&self) -> &str;

    /// `None` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    /// One page of keys in ascending order; `page` starts at 0
    async fn list(&self, page: usize, per_page: usize) -> Result<Vec<String>, AppError>;

    async fn delete_all(&self) -> Result<(), AppError>;
}

/// Create the shared table if the backend does not have it yet
pub async fn init_schema(driver: &dyn Driver) -> Result<(), AppError> {
    let lease = ConnectionLease::acquire(driver, false).await?;
    lease.execute(&create_table_sql(driver.backend()), &[]).await?;
    lease.release();
    tracing::info!("Shared key-value table ready ({})", driver.backend().as_str());
    Ok(())
}

const GET_QUERY: &str = "SELECT PValue FROM PluginKeyValueStore \
    WHERE PluginId = ? AND PKey = ? AND (ExpireAt IS NULL OR ExpireAt = 0 OR ExpireAt > ?)";
const LIST_QUERY: &str = "SELECT PKey FROM PluginKeyValueStore \
    WHERE PluginId = ? AND (ExpireAt IS NULL OR ExpireAt = 0 OR ExpireAt > ?) \
    ORDER BY PKey LIMIT ? OFFSET ?";
const DELETE_QUERY: &str = "DELETE FROM PluginKeyValueStore WHERE PluginId = ? AND PKey = ?";
const DELETE_ALL_QUERY: &str = "DELETE FROM PluginKeyValueStore WHERE PluginId = ?";
const UPSERT_QUERY: &str = "INSERT INTO PluginKeyValueStore (PluginId, PKey, PValue, ExpireAt) \
    VALUES (?, ?, ?, 0) \
    ON CONFLICT (PluginId, PKey) DO UPDATE SET PValue = excluded.PValue, ExpireAt = 0";
const UPSERT_QUERY_MYSQL: &str = "INSERT INTO PluginKeyValueStore (PluginId, PKey, PValue, ExpireAt) \
    VALUES (?, ?, ?, 0) \
    ON DUPLICATE KEY UPDATE PValue = VALUES(PValue), ExpireAt = 0";

/// [`KvApi`] backed by the shared table through a [`Driver`]
pub struct SharedTableKvStore {
    driver: Arc<dyn Driver>,
    owner_id: String,
}

impl SharedTableKvStore {
    pub fn for_owner(driver: Arc<dyn Driver>, owner_id: impl Into<String>) -> Result<Self, AppError> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(AppError::Validation("Owner id cannot be empty".to_string()));
        }
        Ok(Self { driver, owner_id })
    }

    fn sql(&self, template: &str) -> String {
        self.driver.dialect().translate(template)
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn execute(&self, template: &str, params: &[SqlValue]) -> Result<u64, AppError> {
        let lease = ConnectionLease::acquire(self.driver.as_ref(), false).await?;
        let affected = lease.execute(&self.sql(template), params).await?;
        lease.release();
        Ok(affected)
    }
}

#[async_trait::async_trait]
impl KvApi for SharedTableKvStore {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let params = [
            SqlValue::from(self.owner_id.as_str()),
            SqlValue::from(key),
            SqlValue::Integer(Self::now_millis()),
        ];
        let lease = ConnectionLease::acquire(self.driver.as_ref(), false).await?;
        let row = RowDecoder::open(&lease, &self.sql(GET_QUERY), &params)
            .await?
            .first::<ValueRow>()
            .await?;
        lease.release();
        Ok(row.map(|ValueRow(value)| value))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), AppError> {
        let template = match self.driver.backend() {
            Backend::MySQL => UPSERT_QUERY_MYSQL,
            Backend::Sqlite | Backend::PostgreSQL => UPSERT_QUERY,
        };
        let params = [
            SqlValue::from(self.owner_id.as_str()),
            SqlValue::from(key),
            SqlValue::from(value.to_vec()),
        ];
        self.execute(template, &params).await?;
        tracing::debug!("Set key {} for owner {}", key, self.owner_id);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let params = [SqlValue::from(self.owner_id.as_str()), SqlValue::from(key)];
        self.execute(DELETE_QUERY, &params).await?;
        Ok(())
    }

    async fn list(&self, page: usize, per_page: usize) -> Result<Vec<String>, AppError> {
        if per_page == 0 {
            return Err(AppError::Validation("per_page must be greater than zero".to_string()));
        }
        let offset = page.saturating_mul(per_page);
        let params = [
            SqlValue::from(self.owner_id.as_str()),
            SqlValue::Integer(Self::now_millis()),
            SqlValue::Integer(i64::try_from(per_page).unwrap_or(i64::MAX)),
            SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)),
        ];

        let lease = ConnectionLease::acquire(self.driver.as_ref(), false).await?;
        let decoded = RowDecoder::open(&lease, &self.sql(LIST_QUERY), &params)
            .await?
            .collect_lenient::<KeyOnlyRow>()
            .await?;
        lease.release();

        Ok(decoded.rows.into_iter().map(|KeyOnlyRow(key)| key).collect())
    }

    async fn delete_all(&self) -> Result<(), AppError> {
        let removed = self
            .execute(DELETE_ALL_QUERY, &[SqlValue::from(self.owner_id.as_str())])
            .await?;
        tracing::info!("Deleted {} keys for owner {}", removed, self.owner_id);
        Ok(())
    }
}
