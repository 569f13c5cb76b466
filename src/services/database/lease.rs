// Scoped connection and cursor handles
//
// A lease releases its handle exactly once: either through an explicit
// `release()` or when the guard is dropped on an early return or error path.

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::driver::{ConnectionId, CursorId, Driver, RowStatus};
use crate::services::dialect::Dialect;

/// A connection handle that goes back to the driver when dropped
pub struct ConnectionLease<'d> {
    driver: &'d dyn Driver,
    id: ConnectionId,
    released: bool,
}

impl<'d> ConnectionLease<'d> {
    pub async fn acquire(driver: &'d dyn Driver, prefer_replica: bool) -> Result<Self, AppError> {
        let id = driver.acquire_connection(prefer_replica).await?;
        tracing::debug!(
            "Acquired {} from {} driver (prefer_replica: {})",
            id,
            driver.backend().as_str(),
            prefer_replica
        );
        Ok(Self {
            driver,
            id,
            released: false,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    /// Open a cursor. The cursor borrows the lease, so it is always closed
    /// before the connection goes back.
    pub async fn query<'c>(
        &'c self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<CursorLease<'c>, AppError> {
        let id = self.driver.query(self.id, sql, params).await?;
        Ok(CursorLease {
            lease: self,
            id,
            released: false,
        })
    }

    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, AppError> {
        self.driver.execute(self.id, sql, params).await
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.driver.release_connection(self.id);
            tracing::debug!("Released {}", self.id);
        }
    }
}

impl Drop for ConnectionLease<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// An open result set, closed when dropped
pub struct CursorLease<'c> {
    lease: &'c ConnectionLease<'c>,
    id: CursorId,
    released: bool,
}

impl CursorLease<'_> {
    pub async fn next_row(&mut self, dest: &mut Vec<SqlValue>) -> Result<RowStatus, AppError> {
        if self.released {
            return Ok(RowStatus::End);
        }
        self.lease.driver.next_row(self.id, dest).await
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.lease.driver.release_cursor(self.id);
        }
    }
}

impl Drop for CursorLease<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}
