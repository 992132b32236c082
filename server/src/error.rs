use dc_proto::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad message: {0}")]
    Message(#[from] MessageError),

    #[error("an entry for '{0}' is already registered")]
    DuplicateKey(String),

    #[error("cannot handle LDAP {0}")]
    UnexpectedLdapOperation(&'static str),

    /// The `NtVer` filter value was too short for a 4 byte little endian
    /// integer.
    #[error("NtVer value must be at least 4 bytes, got {0}")]
    InvalidNtVersion(usize),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
