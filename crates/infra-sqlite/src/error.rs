// sqlx::Error -> AppError
// (orphan rules: no `From<sqlx::Error> for AppError` outside core)

use courier_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "5" => AppError::Transport(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Transport(format!("Database full: {}", db_err.message())),
                other => AppError::Transport(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => AppError::Transport(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Transport(format!("Column not found: {}", col))
        }
        // Connection, pool and protocol errors
        _ => AppError::Transport(err.to_string()),
    }
}
