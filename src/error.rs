use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the orchestration core.
///
/// The enum is `Clone` so a task's failure can be recorded in the graph and
/// still be handed back to whoever owns the operation.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Remote service failure: {message}")]
    RemoteService { message: String, transient: bool },

    #[error("Missing required input: {field}")]
    MissingInput { field: &'static str },

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Tunnel configuration error: {0}")]
    TunnelConfiguration(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// A remote failure worth retrying (timeouts, 5xx, dropped connections).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::RemoteService {
            message: message.into(),
            transient: true,
        }
    }

    /// A remote failure the backend will keep returning (bad account number, too many devices).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::RemoteService {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteService { transient: true, .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
