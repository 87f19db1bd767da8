//! Error types for queryd.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid queue table name: {0:?}")]
    InvalidTableName(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(StoreError::from(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by the store, with whatever diagnostics it provided.
///
/// For MySQL server errors `code` is the server error number (e.g. 1064)
/// and `sql_state` the five-character SQLSTATE. Client-side failures
/// (I/O, protocol, decoding) carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (error code: {}, SQLState: {})", display_code(.code), display_state(.sql_state))]
pub struct StoreError {
    pub message: String,
    pub code: Option<u16>,
    pub sql_state: Option<String>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            sql_state: None,
        }
    }

    pub fn with_code(mut self, code: u16, sql_state: impl Into<String>) -> Self {
        self.code = Some(code);
        self.sql_state = Some(sql_state.into());
        self
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                    Some(mysql) => Self {
                        message,
                        code: Some(mysql.number()),
                        sql_state: mysql.code().map(str::to_string),
                    },
                    None => Self {
                        message,
                        code: None,
                        sql_state: db_err.code().map(|c| c.into_owned()),
                    },
                }
            }
            _ => Self::new(e.to_string()),
        }
    }
}

/// Error number for log lines and messages, `-` when the store gave none.
pub fn display_code(code: &Option<u16>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn display_state(state: &Option<String>) -> &str {
    state.as_deref().unwrap_or("-")
}
