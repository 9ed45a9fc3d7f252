use std::path::PathBuf;

/// Errors raised while setting up or using the relay socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The relay socket could not be created at `path`.
    #[error("failed to bind relay socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Something other than a socket already lives at `path`.
    #[error("refusing to replace {path}: not a unix socket")]
    Occupied { path: PathBuf },

    /// The socket was created but its permissions could not be applied.
    #[error("failed to set mode {mode:o} on {path}: {source}")]
    Permissions {
        path: PathBuf,
        mode: u32,
        source: std::io::Error,
    },

    /// No relay socket answered at `path`.
    #[error("failed to connect to relay socket {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Accepting a radio daemon connection failed.
    #[error("failed to accept relay connection: {0}")]
    Accept(std::io::Error),

    /// The socket path does not fit in `sockaddr_un`.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
