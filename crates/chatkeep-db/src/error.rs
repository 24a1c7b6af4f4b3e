use rusqlite::ffi;
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Store failures, tagged so callers can tell constraint violations apart
/// from genuine I/O or SQL errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE or PRIMARY KEY constraint rejected the write. Carries the
    /// offending column name when SQLite reports it.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated")]
    ForeignKeyViolation,

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("connection lock poisoned: {0}")]
    Poisoned(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, msg) = &e {
            match err.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return DbError::UniqueViolation(violated_column(msg.as_deref()));
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return DbError::ForeignKeyViolation,
                _ => {}
            }
        }
        DbError::Sqlite(e)
    }
}

/// "UNIQUE constraint failed: users.email" -> "email"
fn violated_column(msg: Option<&str>) -> String {
    msg.and_then(|m| m.split_once("failed: "))
        .and_then(|(_, cols)| cols.split(", ").next())
        .and_then(|col| col.rsplit('.').next())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_column_from_sqlite_message() {
        assert_eq!(violated_column(Some("UNIQUE constraint failed: users.email")), "email");
        assert_eq!(
            violated_column(Some("UNIQUE constraint failed: users.username, users.email")),
            "username"
        );
        assert_eq!(violated_column(None), "unknown");
    }
}
