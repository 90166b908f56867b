/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Socket creation, path resolution, connect, or poll failed.
    #[error("transport error: {0}")]
    Transport(#[from] framechan_transport::TransportError),

    /// Framing failed; on receive this has already closed the channel.
    #[error("frame error: {0}")]
    Frame(#[from] framechan_frame::FrameError),

    /// The channel has been destroyed.
    #[error("channel closed")]
    Closed,

    /// `wait` hit the configured timeout.
    #[error("no data within {0:?}")]
    Timeout(std::time::Duration),
}

impl ChannelError {
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Transport(framechan_transport::TransportError::Closed)
        )
    }

    /// True when no socket path could be found; no connect was attempted.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_resolution())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
