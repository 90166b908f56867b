/// Errors that can occur during frame encoding, decoding and reassembly.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The declared length is smaller than the length field itself.
    #[error("malformed frame length {total} (must be at least 4)")]
    MalformedLength { total: u32 },

    /// A peeked header could not be consumed in full.
    #[error("short header read ({got} of 4 bytes)")]
    ShortHeader { got: usize },

    /// A read returned more bytes than were requested.
    #[error("read returned {got} bytes, requested at most {requested}")]
    InvalidReadLength { got: usize, requested: usize },

    /// The kernel accepted only part of a frame.
    #[error("short write ({sent} of {expected} bytes)")]
    ShortWrite { sent: usize, expected: usize },

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the byte stream can no longer be trusted to resynchronize.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. }
                | Self::MalformedLength { .. }
                | Self::ShortHeader { .. }
                | Self::InvalidReadLength { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
