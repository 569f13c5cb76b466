// PostgreSQL driver using connection pooling for optimal resource management
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::driver::{ConnectionId, CursorId, Driver, RowStatus};
use crate::services::database::registry::{HandleRegistry, MaterializedRows};
use crate::services::database::Backend;

type BoxedParam = Box<dyn ToSql + Sync + Send>;

pub struct PostgreSQLDriver {
    primary: Pool,
    replica: Option<Pool>,
    connections: HandleRegistry<Object>,
    cursors: HandleRegistry<MaterializedRows>,
}

impl PostgreSQLDriver {
    pub fn new(primary: Pool, replica: Option<Pool>) -> Self {
        Self {
            primary,
            replica,
            connections: HandleRegistry::new(),
            cursors: HandleRegistry::new(),
        }
    }

    fn bind(params: &[SqlValue]) -> Vec<BoxedParam> {
        params
            .iter()
            .map(|p| -> BoxedParam {
                match p {
                    // Only nullable column in the shared table is ExpireAt (BIGINT)
                    SqlValue::Null => Box::new(None::<i64>),
                    SqlValue::Integer(i) => Box::new(*i),
                    SqlValue::Real(r) => Box::new(*r),
                    SqlValue::Text(s) => Box::new(s.clone()),
                    SqlValue::Bytes(b) => Box::new(b.clone()),
                }
            })
            .collect()
    }

    fn column_value(row: &Row, idx: usize) -> Result<SqlValue, tokio_postgres::Error> {
        let column_type = row.columns()[idx].type_();
        let value = match *column_type {
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
            }
            Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Integer),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)?
                .map(|v| SqlValue::Integer(v.into())),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| SqlValue::Integer(v.into())),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Real),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(idx)?
                .map(|v| SqlValue::Real(v.into())),
            Type::BOOL => row
                .try_get::<_, Option<bool>>(idx)?
                .map(|v| SqlValue::Integer(v.into())),
            _ => {
                tracing::debug!(
                    "Unsupported PostgreSQL column type {} at index {}, reading as NULL",
                    column_type.name(),
                    idx
                );
                None
            }
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }

    /// A cell that cannot be read becomes NULL, which no row shape accepts,
    /// so listings skip the row instead of failing the whole result set
    fn cell_or_null<E: std::fmt::Display>(cell: Result<SqlValue, E>, idx: usize) -> SqlValue {
        cell.unwrap_or_else(|e| {
            tracing::warn!("Unreadable PostgreSQL column {}: {}", idx, e);
            SqlValue::Null
        })
    }

    fn checkout(&self, conn: ConnectionId) -> Result<Object, AppError> {
        self.connections
            .take(conn.0)
            .ok_or_else(|| AppError::Query(format!("Unknown {}", conn)))
    }
}

#[async_trait::async_trait]
impl Driver for PostgreSQLDriver {
    fn backend(&self) -> Backend {
        Backend::PostgreSQL
    }

    async fn acquire_connection(&self, prefer_replica: bool) -> Result<ConnectionId, AppError> {
        let pool = match (&self.replica, prefer_replica) {
            (Some(replica), true) => replica,
            _ => &self.primary,
        };

        let client = pool.get().await.map_err(|e| {
            AppError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;
        Ok(ConnectionId(self.connections.insert(client)))
    }

    fn release_connection(&self, conn: ConnectionId) {
        // Dropping the pooled object hands it back to deadpool
        if self.connections.remove(conn.0).is_none() {
            tracing::debug!("Release of unknown PostgreSQL {}", conn);
        }
    }

    async fn query(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<CursorId, AppError> {
        let client = self.checkout(conn)?;
        let bound = Self::bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let result = client.query(sql, &refs).await;
        self.connections.restore(conn.0, client);

        let rows = result?;

        let materialized: MaterializedRows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| Self::cell_or_null(Self::column_value(row, idx), idx))
                    .collect()
            })
            .collect();

        Ok(CursorId(self.cursors.insert(materialized)))
    }

    async fn execute(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, AppError> {
        let client = self.checkout(conn)?;
        let bound = Self::bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let result = client.execute(sql, &refs).await;
        self.connections.restore(conn.0, client);

        Ok(result?)
    }

    async fn next_row(
        &self,
        cursor: CursorId,
        dest: &mut Vec<SqlValue>,
    ) -> Result<RowStatus, AppError> {
        self.cursors.next_row(cursor, dest)
    }

    fn release_cursor(&self, cursor: CursorId) {
        self.cursors.remove(cursor.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_preserves_arity() {
        let params = vec![
            SqlValue::from("owner"),
            SqlValue::from("key"),
            SqlValue::from(vec![0u8, 1]),
            SqlValue::Integer(0),
            SqlValue::Null,
        ];
        assert_eq!(PostgreSQLDriver::bind(&params).len(), 5);
    }

    #[test]
    fn test_unreadable_cell_becomes_null() {
        assert_eq!(
            PostgreSQLDriver::cell_or_null(Ok::<_, String>(SqlValue::from("k1")), 0),
            SqlValue::from("k1")
        );
        assert_eq!(
            PostgreSQLDriver::cell_or_null(Err("invalid utf-8"), 1),
            SqlValue::Null
        );
    }

    #[tokio::test]
    async fn test_row_with_unreadable_owner_is_skipped_by_listing() {
        use crate::services::database::mock::MockDriver;
        use crate::services::CrossTenantReader;
        use std::sync::Arc;

        let unreadable = PostgreSQLDriver::cell_or_null(Err::<SqlValue, _>("bad column"), 0);
        let driver = Arc::new(MockDriver::new().with_backend(Backend::PostgreSQL).with_rows(vec![
            vec![SqlValue::from("pluginA"), SqlValue::from("k1")],
            vec![unreadable, SqlValue::from("k2")],
            vec![SqlValue::from("pluginB"), SqlValue::from("k1")],
        ]));

        let entries = CrossTenantReader::new(driver).list_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].owner_id, "pluginB");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some("postgresql://user:pw@127.0.0.1:1/kv".to_string());
        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .unwrap();
        let driver = PostgreSQLDriver::new(pool, None);

        let result = driver.acquire_connection(true).await;
        assert!(matches!(result, Err(AppError::Connection(_))));
        assert!(driver.connections.is_empty());
    }
}
