///
/// Errors raised while setting up or running the query endpoint.
///
/// Request-level failures never surface here: they are answered with a
/// JSON error body and the server keeps running.
///

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Database(#[from] gatesql::Error),

    #[error("Invalid bind address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
