//! Framed client channel to a local service.
//!
//! A [`Channel`] connects to a Unix domain socket, reassembles incoming
//! frames without blocking, and can be torn down from any thread while
//! another is parked in [`ChannelHandle::wait`]:
//!
//! ```no_run
//! use framechan_channel::{Channel, LogLevel};
//!
//! let mut channel = Channel::init(LogLevel::Warn)?;
//! channel.connect("service.sock", "service/ipc.sock")?;
//!
//! let handle = channel.handle().clone();
//! std::thread::spawn(move || {
//!     let _ = handle.send(b"hello");
//! });
//!
//! while channel.wait().is_ok() {
//!     if let Some(payload) = channel.receive()? {
//!         println!("{} bytes", payload.len());
//!     }
//! }
//! # Ok::<(), framechan_channel::ChannelError>(())
//! ```

pub mod channel;
pub mod config;
pub mod error;

pub use channel::{Channel, ChannelHandle};
pub use config::{ChannelConfig, LogLevel};
pub use error::{ChannelError, Result};
