use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Unknown host '{name}'. Available: {available}")]
    UnknownHost { name: String, available: String },

    #[error("Failed to connect to {host}: {source}")]
    ConnectFailed {
        host: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    FeatureUnavailable(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("{0}")]
    Resource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoutError {
    /// Stable kind name, used as the error-counter key and in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => "InvalidTarget",
            Self::UnknownHost { .. } => "UnknownHost",
            Self::ConnectFailed { .. } => "ConnectFailed",
            Self::PathNotFound(_) => "PathNotFound",
            Self::ResourceNotFound(_) => "ResourceNotFound",
            Self::FeatureUnavailable(_) => "FeatureUnavailable",
            Self::ReadFailed(_) => "ReadFailed",
            Self::Resource(_) => "ResourceError",
            Self::Config(_) => "Config",
            Self::Ssh(_) => "Ssh",
            Self::Io(_) => "Io",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
