use thiserror::Error;

#[derive(Debug, Error)]
pub enum PartsmithError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {seconds:.1}s: {command}")]
    Timeout { command: String, seconds: f64 },

    #[error("Unable to create temporary file: {0}")]
    TempFile(String),

    #[error("Unknown filesystem type: {0}")]
    UnknownFilesystem(String),

    #[error("Unable to read usage of mounted filesystem at {path}: {reason}")]
    MountUsage { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
