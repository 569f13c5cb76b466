use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use crate::api::middleware::AppError;

/// Guards the cross-tenant reader: only a single SELECT may go through it
pub struct SqlValidator;

impl SqlValidator {
    /// Validate that `sql` is exactly one read-only query.
    ///
    /// Templates are checked before placeholder translation, so `?` markers
    /// must parse; the generic dialect accepts them.
    pub fn validate_read_only(sql: &str) -> Result<(), AppError> {
        let dialect = GenericDialect {};
        let ast = Parser::parse_sql(&dialect, sql)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        match ast.as_slice() {
            [] => Err(AppError::InvalidSql("Empty SQL query".to_string())),
            [Statement::Query(_)] => Ok(()),
            [stmt] => Err(AppError::InvalidSql(format!(
                "Only SELECT queries may run with cross-tenant access. Found: {}",
                Self::statement_kind(stmt)
            ))),
            _ => Err(AppError::InvalidSql(
                "Multiple statements are not allowed".to_string(),
            )),
        }
    }

    fn statement_kind(stmt: &Statement) -> &'static str {
        match stmt {
            Statement::Insert { .. } => "INSERT",
            Statement::Update { .. } => "UPDATE",
            Statement::Delete { .. } => "DELETE",
            Statement::Drop { .. } => "DROP",
            Statement::CreateTable { .. } => "CREATE TABLE",
            Statement::AlterTable { .. } => "ALTER TABLE",
            _ => "non-query statement",
        }
    }
}
