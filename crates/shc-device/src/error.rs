use std::path::PathBuf;

/// Errors raised by device collaborators.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The value is not one of the recognized environment tokens.
    #[error("invalid environment '{0}' (expected 'dev' or 'prod')")]
    InvalidEnvironment(String),

    /// The store file could not be read or written.
    #[error("store I/O error at {path}: {source}")]
    StoreIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The store file does not contain a JSON object of strings.
    #[error("store at {path} is not valid JSON: {source}")]
    StoreFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A hardware command could not be started.
    #[error("failed to run '{command}': {source}")]
    CommandSpawn {
        command: String,
        source: std::io::Error,
    },

    /// A hardware command exited unsuccessfully.
    #[error("'{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// Command output did not contain the expected value.
    #[error("could not parse {what} from command output")]
    Parse { what: &'static str },
}

pub type Result<T> = std::result::Result<T, DeviceError>;
