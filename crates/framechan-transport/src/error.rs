use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The OS refused to allocate a socket.
    #[error("failed to create socket: {0}")]
    Resource(std::io::Error),

    /// None of the candidate paths is an existing Unix socket.
    #[error("no socket found (tried {})", display_paths(.candidates))]
    SocketNotFound { candidates: Vec<PathBuf> },

    /// Neither a data-home nor a home directory is available for the fallback path.
    #[error("cannot resolve fallback socket path: XDG_DATA_HOME and HOME are unset or empty")]
    NoSearchRoot,

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The socket has been destroyed.
    #[error("socket closed")]
    Closed,

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for failures that happen before any connection attempt is made.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::SocketNotFound { .. } | Self::NoSearchRoot | Self::PathTooLong { .. }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, TransportError>;
