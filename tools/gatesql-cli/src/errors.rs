use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Database(#[from] gatesql::Error),

    #[error("{0}")]
    Server(#[from] gatesql_http::ServerError),

    #[error("{0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(String),
}
