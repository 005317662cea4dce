use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inventory server error: {0}")]
    Api(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent is not registered with the inventory server")]
    NotRegistered,

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },
}

impl HostwatchError {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            HostwatchError::Config(_) => "CONFIG_ERROR",
            HostwatchError::Api(_) => "API_ERROR",
            HostwatchError::Serialization(_) => "SERIALIZATION_ERROR",
            HostwatchError::Io(_) => "IO_ERROR",
            HostwatchError::NotRegistered => "NOT_REGISTERED",
            HostwatchError::Timeout { .. } => "TIMEOUT",
        }
    }
}

pub type Result<T> = std::result::Result<T, HostwatchError>;
