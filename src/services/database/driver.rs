// Driver capability: handle-based access to the shared key-value table
use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::Backend;
use crate::services::dialect::Dialect;
use std::fmt;

/// Opaque identifier of a leased connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Opaque identifier of an open result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor#{}", self.0)
    }
}

/// Outcome of advancing a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// The destination slots hold the next row
    Row,
    /// The result set is exhausted
    End,
}

/// Low-level database access used by the key-value services.
///
/// Connections and cursors are identified by opaque handles that must be
/// handed back to the same driver. Every acquired handle has to be released
/// exactly once; prefer the scoped guards in [`super::lease`] over calling
/// the release methods directly.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// Backend family this driver talks to
    fn backend(&self) -> Backend;

    /// Placeholder convention for query templates
    fn dialect(&self) -> Dialect {
        self.backend().dialect()
    }

    /// Lease a connection. `prefer_replica` asks for a read replica when one
    /// is configured, falling back to the primary.
    async fn acquire_connection(&self, prefer_replica: bool) -> Result<ConnectionId, AppError>;

    /// Return a connection to the driver. Unknown handles are ignored.
    fn release_connection(&self, conn: ConnectionId);

    /// Run a query and open a cursor over its result set
    async fn query(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<CursorId, AppError>;

    /// Run a statement that returns no rows; yields the affected row count
    async fn execute(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, AppError>;

    /// Advance `cursor` by one row, replacing the contents of `dest`
    async fn next_row(
        &self,
        cursor: CursorId,
        dest: &mut Vec<SqlValue>,
    ) -> Result<RowStatus, AppError>;

    /// Close a cursor. Unknown handles are ignored.
    fn release_cursor(&self, cursor: CursorId);
}
