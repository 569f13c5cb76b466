// Layout of the shared key-value table and its row shapes
use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::Backend;
use crate::services::row_decoder::{bytes_column, text_column, FromRow};

pub const TABLE: &str = "PluginKeyValueStore";

/// DDL for the shared table. `ExpireAt` is epoch milliseconds, 0 for never.
pub fn create_table_sql(backend: Backend) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         PluginId VARCHAR(190) NOT NULL, \
         PKey VARCHAR(150) NOT NULL, \
         PValue {}, \
         ExpireAt BIGINT DEFAULT 0, \
         PRIMARY KEY (PluginId, PKey))",
        TABLE,
        backend.binary_type()
    )
}

/// `(owner_id, key)` projection used by listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    pub owner_id: String,
    pub key: String,
}

impl FromRow for KeyRow {
    const COLUMNS: usize = 2;

    fn from_row(mut row: Vec<SqlValue>) -> Result<Self, AppError> {
        Ok(Self {
            owner_id: text_column(&mut row, 0, "PluginId")?,
            key: text_column(&mut row, 1, "PKey")?,
        })
    }
}

/// Single `PKey` column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOnlyRow(pub String);

impl FromRow for KeyOnlyRow {
    const COLUMNS: usize = 1;

    fn from_row(mut row: Vec<SqlValue>) -> Result<Self, AppError> {
        text_column(&mut row, 0, "PKey").map(Self)
    }
}

/// Single `PValue` column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRow(pub Vec<u8>);

impl FromRow for ValueRow {
    const COLUMNS: usize = 1;

    fn from_row(mut row: Vec<SqlValue>) -> Result<Self, AppError> {
        bytes_column(&mut row, 0, "PValue").map(Self)
    }
}
