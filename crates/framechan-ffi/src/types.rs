use std::ffi::c_void;
use std::sync::Mutex;

use framechan_channel::{Channel, ChannelHandle, LogLevel};

pub const FRAMECHAN_LOG_TRACE: u32 = 0;
pub const FRAMECHAN_LOG_DEBUG: u32 = 1;
pub const FRAMECHAN_LOG_INFO: u32 = 2;
pub const FRAMECHAN_LOG_WARN: u32 = 3;
pub const FRAMECHAN_LOG_ERROR: u32 = 4;
pub const FRAMECHAN_LOG_OFF: u32 = 5;

pub type FramechanHandle = *mut c_void;

pub(crate) fn log_level_arg(level: u32) -> Option<LogLevel> {
    match level {
        FRAMECHAN_LOG_TRACE => Some(LogLevel::Trace),
        FRAMECHAN_LOG_DEBUG => Some(LogLevel::Debug),
        FRAMECHAN_LOG_INFO => Some(LogLevel::Info),
        FRAMECHAN_LOG_WARN => Some(LogLevel::Warn),
        FRAMECHAN_LOG_ERROR => Some(LogLevel::Error),
        FRAMECHAN_LOG_OFF => Some(LogLevel::Off),
        _ => None,
    }
}

/// Heap state behind a [`FramechanHandle`].
///
/// `shared` serves the thread-safe exports without touching the lock; the
/// receive side sits behind a mutex that is only ever `try_lock`ed, so a
/// second concurrent reader is reported instead of blocking.
pub(crate) struct ChannelState {
    pub(crate) shared: ChannelHandle,
    pub(crate) reader: Mutex<Channel>,
}

impl ChannelState {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            shared: channel.handle().clone(),
            reader: Mutex::new(channel),
        }
    }
}
