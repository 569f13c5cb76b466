// MySQL driver using connection pooling for optimal resource management
use mysql_async::{prelude::*, Conn, Opts, Params, Pool, Row, Value as MySqlValue};
use url::Url;

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::driver::{ConnectionId, CursorId, Driver, RowStatus};
use crate::services::database::registry::{HandleRegistry, MaterializedRows};
use crate::services::database::Backend;

/// MySQL collation id of the `binary` character set; BLOB/BINARY columns use it
const BINARY_CHARSET: u16 = 63;

pub struct MySQLDriver {
    primary: Pool,
    replica: Option<Pool>,
    connections: HandleRegistry<Conn>,
    cursors: HandleRegistry<MaterializedRows>,
}

impl MySQLDriver {
    pub fn new(connection_url: &str, replica_url: Option<&str>) -> Result<Self, AppError> {
        let primary = Self::create_pool(connection_url)?;
        let replica = replica_url.map(Self::create_pool).transpose()?;

        Ok(Self {
            primary,
            replica,
            connections: HandleRegistry::new(),
            cursors: HandleRegistry::new(),
        })
    }

    fn create_pool(connection_url: &str) -> Result<Pool, AppError> {
        // Validate MySQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(AppError::Validation("URL must use mysql:// or mariadb:// scheme".to_string()));
        }

        // mysql_async only understands the mysql:// scheme
        let normalized = if url.scheme() == "mariadb" {
            connection_url.replacen("mariadb://", "mysql://", 1)
        } else {
            connection_url.to_string()
        };
        let opts = Opts::from_url(&normalized)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        Ok(Pool::new(opts))
    }

    fn bind(params: &[SqlValue]) -> Params {
        let values: Vec<MySqlValue> = params
            .iter()
            .map(|p| match p {
                SqlValue::Null => MySqlValue::NULL,
                SqlValue::Integer(i) => MySqlValue::Int(*i),
                SqlValue::Real(r) => MySqlValue::Double(*r),
                SqlValue::Text(s) => MySqlValue::Bytes(s.as_bytes().to_vec()),
                SqlValue::Bytes(b) => MySqlValue::Bytes(b.clone()),
            })
            .collect();
        Params::from(values)
    }

    /// Helper function to convert a MySQL value to an untyped column value.
    /// MySQL reports text and binary columns alike as bytes, so the column's
    /// character set decides which one it is.
    fn column_value(mysql_val: MySqlValue, binary: bool) -> SqlValue {
        match mysql_val {
            MySqlValue::NULL => SqlValue::Null,
            MySqlValue::Bytes(bytes) if binary => SqlValue::Bytes(bytes),
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => SqlValue::Text(s),
                Err(e) => SqlValue::Bytes(e.into_bytes()),
            },
            MySqlValue::Int(i) => SqlValue::Integer(i),
            MySqlValue::UInt(u) => match i64::try_from(u) {
                Ok(i) => SqlValue::Integer(i),
                Err(_) => SqlValue::Text(u.to_string()),
            },
            MySqlValue::Float(f) => SqlValue::Real(f.into()),
            MySqlValue::Double(d) => SqlValue::Real(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => SqlValue::Text(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                y, m, d, h, min, s
            )),
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                SqlValue::Text(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn materialize(rows: Vec<Row>) -> MaterializedRows {
        let mut materialized = MaterializedRows::with_capacity(rows.len());
        for row in rows {
            let binary: Vec<bool> = row
                .columns_ref()
                .iter()
                .map(|c| c.character_set() == BINARY_CHARSET)
                .collect();
            let values = binary
                .iter()
                .enumerate()
                .map(|(idx, is_binary)| match row.get_opt::<MySqlValue, usize>(idx) {
                    Some(Ok(mysql_val)) => Self::column_value(mysql_val, *is_binary),
                    Some(Err(_)) | None => SqlValue::Null,
                })
                .collect();
            materialized.push_back(values);
        }
        materialized
    }

    fn checkout(&self, conn: ConnectionId) -> Result<Conn, AppError> {
        self.connections
            .take(conn.0)
            .ok_or_else(|| AppError::Query(format!("Unknown {}", conn)))
    }
}

#[async_trait::async_trait]
impl Driver for MySQLDriver {
    fn backend(&self) -> Backend {
        Backend::MySQL
    }

    async fn acquire_connection(&self, prefer_replica: bool) -> Result<ConnectionId, AppError> {
        let pool = match (&self.replica, prefer_replica) {
            (Some(replica), true) => replica,
            _ => &self.primary,
        };

        let conn = pool.get_conn().await.map_err(|e| {
            AppError::Connection(format!("Failed to get MySQL connection from pool: {}", e))
        })?;
        Ok(ConnectionId(self.connections.insert(conn)))
    }

    fn release_connection(&self, conn: ConnectionId) {
        // Dropping a pooled Conn returns it to the pool
        if self.connections.remove(conn.0).is_none() {
            tracing::debug!("Release of unknown MySQL {}", conn);
        }
    }

    async fn query(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<CursorId, AppError> {
        let mut client = self.checkout(conn)?;
        let result: Result<Vec<Row>, _> = client.exec(sql, Self::bind(params)).await;
        self.connections.restore(conn.0, client);

        let rows = result?;
        Ok(CursorId(self.cursors.insert(Self::materialize(rows))))
    }

    async fn execute(
        &self,
        conn: ConnectionId,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, AppError> {
        let mut client = self.checkout(conn)?;
        let result = client.exec_drop(sql, Self::bind(params)).await;
        let affected = client.affected_rows();
        self.connections.restore(conn.0, client);

        result?;
        Ok(affected)
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
