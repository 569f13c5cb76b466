// In-memory driver for tests: serves canned rows and records every handle
// acquisition and release.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::driver::{ConnectionId, CursorId, Driver, RowStatus};
use crate::services::database::registry::{HandleRegistry, MaterializedRows};
use crate::services::database::Backend;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    pub acquired: usize,
    pub released: usize,
    pub cursors_opened: usize,
    pub cursors_released: usize,
    /// Releases of handles that were never issued or already released
    pub unknown_releases: usize,
    pub live_connections: usize,
    pub live_cursors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub struct MockDriver {
    backend: Backend,
    rows: Vec<Vec<SqlValue>>,
    fail_acquire: bool,
    fail_query: bool,
    /// Fail `next_row` once this many rows have been served
    fail_next_after: Option<usize>,
    connections: HandleRegistry<bool>,
    cursors: HandleRegistry<MaterializedRows>,
    served: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    cursors_opened: AtomicUsize,
    cursors_released: AtomicUsize,
    unknown_releases: AtomicUsize,
    queries: Mutex<Vec<RecordedQuery>>,
    replica_requests: Mutex<Vec<bool>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            backend: Backend::Sqlite,
            rows: Vec::new(),
            fail_acquire: false,
            fail_query: false,
            fail_next_after: None,
            connections: HandleRegistry::new(),
            cursors: HandleRegistry::new(),
            served: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            cursors_opened: AtomicUsize::new(0),
            cursors_released: AtomicUsize::new(0),
            unknown_releases: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            replica_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn fail_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn fail_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    pub fn fail_next_after(mut self, rows: usize) -> Self {
        self.fail_next_after = Some(rows);
        self
    }

    pub fn stats(&self) -> MockStats {
        MockStats {
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            cursors_opened: self.cursors_opened.load(Ordering::SeqCst),
            cursors_released: self.cursors_released.load(Ordering::SeqCst),
            unknown_releases: self.unknown_releases.load(Ordering::SeqCst),
            live_connections: self.connections.len(),
            live_cursors: self.cursors.len(),
        }
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn replica_requests(&self) -> Vec<bool> {
        self.replica_requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Driver for MockDriver {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn acquire_connection(&self, prefer_replica: bool) -> Result<ConnectionId, AppError> {
        self.replica_requests.lock().unwrap().push(prefer_replica);
        if self.fail_acquire {
            return Err(AppError::Connection("mock pool exhausted".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionId(self.connections.insert(prefer_replica)))
    }

    fn release_connection(&self, conn: ConnectionId) {
        match self.connections.remove(conn.0) {
            Some(_) => self.released.fetch_add(1, Ordering::SeqCst),
            None => self.unknown_releases.fetch_add(1, Ordering::SeqCst),
        };
    }

    async fn query(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<CursorId, AppError> {
        if self.connections.with(conn.0, |_| ()).is_none() {
            return Err(AppError::Query(format!("Unknown {}", conn)));
        }
        self.queries.lock().unwrap().push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if self.fail_query {
            return Err(AppError::Query("mock syntax error".to_string()));
        }
        self.cursors_opened.fetch_add(1, Ordering::SeqCst);
        let rows: MaterializedRows = self.rows.clone().into();
        Ok(CursorId(self.cursors.insert(rows)))
    }

    async fn execute(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, AppError> {
        if self.connections.with(conn.0, |_| ()).is_none() {
            return Err(AppError::Query(format!("Unknown {}", conn)));
        }
        self.queries.lock().unwrap().push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if self.fail_query {
            return Err(AppError::Query("mock syntax error".to_string()));
        }
        Ok(0)
    }

    async fn next_row(
        &self,
        cursor: CursorId,
        dest: &mut Vec<SqlValue>,
    ) -> Result<RowStatus, AppError> {
        if let Some(limit) = self.fail_next_after {
            if self.served.load(Ordering::SeqCst) >= limit {
                return Err(AppError::Query("mock connection lost".to_string()));
            }
        }
        let status = self.cursors.next_row(cursor, dest)?;
        if status == RowStatus::Row {
            self.served.fetch_add(1, Ordering::SeqCst);
        }
        Ok(status)
    }

    fn release_cursor(&self, cursor: CursorId) {
        match self.cursors.remove(cursor.0) {
            Some(_) => self.cursors_released.fetch_add(1, Ordering::SeqCst),
            None => self.unknown_releases.fetch_add(1, Ordering::SeqCst),
        };
    }
}
