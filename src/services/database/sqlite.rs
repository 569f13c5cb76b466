// SQLite driver: one rusqlite connection per lease, result sets materialized
use std::time::Duration;

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::driver::{ConnectionId, CursorId, Driver, RowStatus};
use crate::services::database::registry::{HandleRegistry, MaterializedRows};
use crate::services::database::Backend;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteDriver {
    path: String,
    connections: HandleRegistry<Connection>,
    cursors: HandleRegistry<MaterializedRows>,
}

impl SqliteDriver {
    /// Accepts a bare path or a `sqlite:` / `sqlite://` URL
    pub fn new(database_url: &str) -> Result<Self, AppError> {
        let path = Self::clean_path(database_url);
        if path.is_empty() {
            return Err(AppError::Validation("SQLite database path cannot be empty".to_string()));
        }

        Ok(Self {
            path: path.to_string(),
            connections: HandleRegistry::new(),
            cursors: HandleRegistry::new(),
        })
    }

    fn clean_path(database_url: &str) -> &str {
        if database_url.starts_with("sqlite:") {
            database_url
                .trim_start_matches("sqlite:")
                .trim_start_matches("//")
        } else {
            database_url
        }
    }

    /// Replica-preferring leases open the file read-only; SQLite has no
    /// replicas, so this is the closest read-scoped equivalent.
    fn open(&self, prefer_replica: bool) -> rusqlite::Result<Connection> {
        let mode = if prefer_replica {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        let conn = Connection::open_with_flags(
            &self.path,
            mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn bind(params: &[SqlValue]) -> Vec<SqliteValue> {
        params
            .iter()
            .map(|p| match p {
                SqlValue::Null => SqliteValue::Null,
                SqlValue::Integer(i) => SqliteValue::Integer(*i),
                SqlValue::Real(r) => SqliteValue::Real(*r),
                SqlValue::Text(s) => SqliteValue::Text(s.clone()),
                SqlValue::Bytes(b) => SqliteValue::Blob(b.clone()),
            })
            .collect()
    }

    fn column_value(value: ValueRef<'_>) -> SqlValue {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(r) => SqlValue::Real(r),
            ValueRef::Text(t) => match String::from_utf8(t.to_vec()) {
                Ok(s) => SqlValue::Text(s),
                Err(e) => SqlValue::Bytes(e.into_bytes()),
            },
            ValueRef::Blob(b) => SqlValue::Bytes(b.to_vec()),
        }
    }

    fn run_query(
        conn: &Connection,
        sql: &str,
        params: Vec<SqliteValue>,
    ) -> rusqlite::Result<MaterializedRows> {
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut materialized = MaterializedRows::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(Self::column_value(row.get_ref(idx)?));
            }
            materialized.push_back(values);
        }
        Ok(materialized)
    }

    /// Check the connection out of the registry and run `f` on the blocking
    /// pool, so a statement waiting on a database lock never holds the
    /// registry lock.
    async fn with_connection<R, F>(&self, conn: ConnectionId, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let connection = self
            .connections
            .take(conn.0)
            .ok_or_else(|| AppError::Query(format!("Unknown {}", conn)))?;

        let (connection, result) = tokio::task::spawn_blocking(move || {
            let result = f(&connection);
            (connection, result)
        })
        .await
        .map_err(|e| AppError::Internal(format!("SQLite worker for {} failed: {}", conn, e)))?;

        self.connections.restore(conn.0, connection);
        Ok(result?)
    }
}

#[async_trait::async_trait]
impl Driver for SqliteDriver {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn acquire_connection(&self, prefer_replica: bool) -> Result<ConnectionId, AppError> {
        let conn = self.open(prefer_replica).map_err(|e| {
            AppError::Connection(format!("Failed to open SQLite database {}: {}", self.path, e))
        })?;
        Ok(ConnectionId(self.connections.insert(conn)))
    }

    fn release_connection(&self, conn: ConnectionId) {
        if self.connections.remove(conn.0).is_none() {
            tracing::debug!("Release of unknown SQLite {}", conn);
        }
    }

    async fn query(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<CursorId, AppError> {
        let sql = sql.to_string();
        let bound = Self::bind(params);
        let rows = self
            .with_connection(conn, move |c| Self::run_query(c, &sql, bound))
            .await?;

        Ok(CursorId(self.cursors.insert(rows)))
    }

    async fn execute(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, AppError> {
        let sql = sql.to_string();
        let bound = Self::bind(params);
        let affected = self
            .with_connection(conn, move |c| c.execute(&sql, params_from_iter(bound)))
            .await?;

        Ok(affected as u64)
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
