//! Framed client channel to a local service over Unix domain sockets.
//!
//! framechan connects to a service socket found in the runtime or user data
//! directory, exchanges length-prefixed frames with it, and can be shut down
//! from any thread while another is blocked waiting for data.
//!
//! # Crate Structure
//!
//! - [`transport`]: pinned socket handle, path resolution
//! - [`frame`]: wire format, non-blocking reader, single-call writer
//! - [`channel`]: the client channel built on both

/// Re-export transport types.
pub mod transport {
    pub use framechan_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framechan_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use framechan_channel::*;
}

pub use framechan_channel::{Channel, ChannelConfig, ChannelError, ChannelHandle, LogLevel};
