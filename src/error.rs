use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server is shut down")]
    ServerClosed,

    #[error("too many connections")]
    TooManyConnections,
}

pub type Result<T> = std::result::Result<T, LogServerError>;
