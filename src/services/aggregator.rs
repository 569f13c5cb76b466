// Cross-tenant key listing and lookup
//
// Reads the shared table directly instead of going through the owner-scoped
// KV API. Holding a `CrossTenantReader` is what grants that access; it is
// only built when cross-tenant access is enabled in configuration.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{Entry, OwnerKeys, SqlValue};
use crate::services::database::{ConnectionLease, Driver};
use crate::services::row_decoder::RowDecoder;
use crate::services::shared_table::{KeyRow, ValueRow};
use crate::validation::SqlValidator;

const LIST_ALL_QUERY: &str =
    "SELECT PluginId, PKey FROM PluginKeyValueStore ORDER BY PluginId, PKey";
const LOOKUP_QUERY: &str =
    "SELECT PValue FROM PluginKeyValueStore WHERE PluginId = ? AND PKey = ?";

/// Elevated, read-only access to every owner's keys
pub struct CrossTenantReader {
    driver: Arc<dyn Driver>,
}

impl CrossTenantReader {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Check the template is read-only, then rewrite it for the driver's dialect
    fn prepare(&self, template: &str) -> Result<String, AppError> {
        SqlValidator::validate_read_only(template)?;
        Ok(self.driver.dialect().translate(template))
    }

    /// Every stored key, without values, ordered by `(owner_id, key)`.
    ///
    /// Rows that fail to decode are skipped. Connection and query failures
    /// discard the partial listing and come back as [`AppError::Aggregation`].
    pub async fn list_all(&self) -> Result<Vec<Entry>, AppError> {
        self.list_all_inner().await.map_err(|e| {
            tracing::error!("Cross-tenant listing failed: {}", e);
            AppError::aggregation(e)
        })
    }

    async fn list_all_inner(&self) -> Result<Vec<Entry>, AppError> {
        let sql = self.prepare(LIST_ALL_QUERY)?;
        let lease = ConnectionLease::acquire(self.driver.as_ref(), true).await?;

        let decoded = RowDecoder::open(&lease, &sql, &[])
            .await?
            .collect_lenient::<KeyRow>()
            .await?;

        if decoded.skipped > 0 {
            tracing::warn!(
                "Cross-tenant listing skipped {} undecodable rows",
                decoded.skipped
            );
        }
        tracing::debug!("Cross-tenant listing returned {} keys", decoded.rows.len());

        lease.release();
        Ok(decoded
            .rows
            .into_iter()
            .map(|row| Entry::new(row.owner_id, row.key))
            .collect())
    }

    /// Fetch one entry with its value.
    ///
    /// A row whose value is not binary is reported as not found, the same as
    /// a missing row.
    pub async fn lookup(&self, owner_id: &str, key: &str) -> Result<Entry, AppError> {
        let sql = self.prepare(LOOKUP_QUERY)?;
        let params = [SqlValue::from(owner_id), SqlValue::from(key)];
        let lease = ConnectionLease::acquire(self.driver.as_ref(), true).await?;

        let row = RowDecoder::open(&lease, &sql, &params)
            .await?
            .first::<ValueRow>()
            .await;
        lease.release();

        let not_found = || AppError::NotFound(format!("Key `{}` not found for owner `{}`", key, owner_id));
        match row {
            Ok(Some(ValueRow(value))) => Ok(Entry::new(owner_id, key).with_value(value)),
            Ok(None) => Err(not_found()),
            Err(AppError::Decode(msg)) => {
                tracing::warn!("Undecodable value for {}:{}: {}", owner_id, key, msg);
                Err(not_found())
            }
            Err(e) => Err(e),
        }
    }
}

/// Group an ordered listing by owner, keeping the order in which owners
/// first appear and each owner's key order
pub fn group_by_owner(entries: &[Entry]) -> Vec<OwnerKeys> {
    let mut groups: Vec<OwnerKeys> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        let slot = *index.entry(entry.owner_id.as_str()).or_insert_with(|| {
            groups.push(OwnerKeys {
                owner_id: entry.owner_id.clone(),
                keys: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].keys.push(entry.key.clone());
    }

    groups
}
