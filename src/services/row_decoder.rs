// Row decoding: iterate a cursor and coerce untyped column values into
// typed records
use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::{ConnectionLease, CursorLease, RowStatus};

/// A record that can be built from one result row
pub trait FromRow: Sized {
    /// Number of columns the record expects
    const COLUMNS: usize;

    /// Build the record. Returns [`AppError::Decode`] on a type mismatch.
    fn from_row(row: Vec<SqlValue>) -> Result<Self, AppError>;
}

/// Take column `idx` as text
pub fn text_column(row: &mut [SqlValue], idx: usize, name: &str) -> Result<String, AppError> {
    std::mem::replace(&mut row[idx], SqlValue::Null)
        .into_text()
        .map_err(|v| AppError::Decode(format!("column {} is {}, expected text", name, v.kind())))
}

/// Take column `idx` as bytes
pub fn bytes_column(row: &mut [SqlValue], idx: usize, name: &str) -> Result<Vec<u8>, AppError> {
    std::mem::replace(&mut row[idx], SqlValue::Null)
        .into_bytes()
        .map_err(|v| AppError::Decode(format!("column {} is {}, expected bytes", name, v.kind())))
}

/// Rows kept by a best-effort listing, plus how many were dropped
#[derive(Debug)]
pub struct Decoded<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

/// Iterates one open cursor. The cursor is released when the decoder is
/// dropped, including after a failure part-way through.
pub struct RowDecoder<'c> {
    cursor: CursorLease<'c>,
    buf: Vec<SqlValue>,
    done: bool,
}

impl<'c> RowDecoder<'c> {
    pub async fn open(
        lease: &'c ConnectionLease<'_>,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Self, AppError> {
        let cursor = lease.query(sql, params).await?;
        Ok(Self {
            cursor,
            buf: Vec::new(),
            done: false,
        })
    }

    /// Advance by one row.
    ///
    /// `Ok(None)` marks the end of the result set. A row that does not fit `T`
    /// yields [`AppError::Decode`] and iteration may continue; any other
    /// error comes from the driver.
    pub async fn next<T: FromRow>(&mut self) -> Result<Option<T>, AppError> {
        if self.done {
            return Ok(None);
        }

        match self.cursor.next_row(&mut self.buf).await? {
            RowStatus::End => {
                self.done = true;
                Ok(None)
            }
            RowStatus::Row => {
                if self.buf.len() != T::COLUMNS {
                    return Err(AppError::Decode(format!(
                        "expected {} columns, row has {}",
                        T::COLUMNS,
                        self.buf.len()
                    )));
                }
                T::from_row(std::mem::take(&mut self.buf)).map(Some)
            }
        }
    }

    /// Read every row, skipping the ones that fail to decode
    pub async fn collect_lenient<T: FromRow>(mut self) -> Result<Decoded<T>, AppError> {
        let mut rows = Vec::new();
        let mut skipped = 0;

        loop {
            match self.next::<T>().await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break,
                Err(AppError::Decode(msg)) => {
                    skipped += 1;
                    tracing::warn!("Skipping undecodable row: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }

        self.cursor.release();
        Ok(Decoded { rows, skipped })
    }

    /// Read only the first row. Decode failures are returned to the caller.
    pub async fn first<T: FromRow>(mut self) -> Result<Option<T>, AppError> {
        let row = self.next::<T>().await;
        self.cursor.release();
        row
    }
}
