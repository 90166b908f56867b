use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use framechan_frame::{write_frame, ActivityClock, FrameReader, ReadState};
use framechan_transport::{Pinned, SocketResolver, TransportError, UnixSocket};

use crate::config::{ChannelConfig, LogLevel};
use crate::error::{ChannelError, Result};

/// Emit a `tracing` event only if the channel's own threshold allows it.
macro_rules! chan_log {
    ($threshold:expr, error, $($arg:tt)+) => {
        if $threshold.enables(tracing::Level::ERROR) {
            tracing::error!($($arg)+);
        }
    };
    ($threshold:expr, debug, $($arg:tt)+) => {
        if $threshold.enables(tracing::Level::DEBUG) {
            tracing::debug!($($arg)+);
        }
    };
}

#[derive(Debug)]
struct Shared {
    socket: UnixSocket,
    clock: Arc<ActivityClock>,
    config: ChannelConfig,
}

/// Thread-safe side of a [`Channel`]: send, wait, destroy.
///
/// Cheap to clone. Every clone refers to the same socket; destroying through
/// any of them closes the channel for all.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    fn pin(&self) -> Result<Pinned<'_>> {
        self.shared.socket.pin().map_err(|_| ChannelError::Closed)
    }

    /// Send one frame. Safe to call from several threads at once.
    ///
    /// Fails without retrying if the kernel accepts less than the whole frame.
    /// A failed send does not close the channel.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let mut pinned = self.pin()?;
        write_frame(&mut pinned, payload).map_err(|err| {
            chan_log!(self.shared.config.log_level, debug, error = %err, len = payload.len(), "send failed");
            ChannelError::from(err)
        })
    }

    /// Block until the socket is readable or the channel is destroyed.
    ///
    /// Readability may be gone by the time [`Channel::receive`] runs; callers
    /// loop on wait + receive. With `wait_timeout` configured, returns
    /// [`ChannelError::Timeout`] when it elapses.
    pub fn wait(&self) -> Result<()> {
        self.poll_readable(self.shared.config.wait_timeout)
    }

    /// [`ChannelHandle::wait`] bounded by `timeout` instead of the configured one.
    pub fn wait_for(&self, timeout: Duration) -> Result<()> {
        self.poll_readable(Some(timeout))
    }

    fn poll_readable(&self, timeout: Option<Duration>) -> Result<()> {
        let pinned = self.pin()?;
        match pinned.poll_readable(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ChannelError::Timeout(timeout.unwrap_or_default())),
            Err(err) => {
                chan_log!(self.shared.config.log_level, error, error = %err, "poll failed");
                Err(TransportError::Io(err).into())
            }
        }
    }

    /// Shut the socket down and close it once in-flight calls return.
    ///
    /// Unblocks a thread parked in [`ChannelHandle::wait`]. Idempotent;
    /// returns `true` only for the call that closed the socket.
    pub fn destroy(&self) -> bool {
        self.shared.socket.destroy()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.socket.is_closed()
    }

    /// When the last frame header was parsed (or the channel was created).
    pub fn last_activity(&self) -> Instant {
        self.shared.clock.last()
    }

    /// Time since [`ChannelHandle::last_activity`].
    pub fn idle(&self) -> Duration {
        self.shared.clock.idle()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Number of calls currently using the socket.
    pub fn in_flight(&self) -> usize {
        self.shared.socket.pin_count()
    }
}

/// A framed client connection to a local service.
///
/// `Channel` owns the receive side and is meant for a single reader thread;
/// [`Channel::handle`] hands out the thread-safe half for senders and for
/// whoever needs to tear the connection down.
#[derive(Debug)]
pub struct Channel {
    handle: ChannelHandle,
    reader: FrameReader,
}

impl Channel {
    /// Allocate an unconnected channel with the default configuration at `log_level`.
    pub fn init(log_level: LogLevel) -> Result<Self> {
        Self::new(ChannelConfig::default().with_log_level(log_level))
    }

    /// Allocate an unconnected channel.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        let socket = UnixSocket::new().map_err(|err| {
            chan_log!(config.log_level, error, error = %err, "socket allocation failed");
            err
        })?;
        Ok(Self::from_socket(socket, config))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream, config: ChannelConfig) -> Self {
        Self::from_socket(UnixSocket::from_stream(stream), config)
    }

    fn from_socket(socket: UnixSocket, config: ChannelConfig) -> Self {
        let clock = Arc::new(ActivityClock::new());
        let reader = FrameReader::with_clock(Arc::clone(&clock));
        Self {
            handle: ChannelHandle {
                shared: Arc::new(Shared {
                    socket,
                    clock,
                    config,
                }),
            },
            reader,
        }
    }

    /// Resolve the service socket from the process environment and connect.
    ///
    /// Looks for `runtime_path` under the runtime directory, then for
    /// `fallback_name` under the user data directory. Returns the path used.
    pub fn connect(&self, runtime_path: &str, fallback_name: &str) -> Result<PathBuf> {
        self.connect_with(
            &SocketResolver::from_process_env(),
            runtime_path,
            fallback_name,
        )
    }

    /// [`Channel::connect`] with an explicit resolver.
    pub fn connect_with(
        &self,
        resolver: &SocketResolver,
        runtime_path: &str,
        fallback_name: &str,
    ) -> Result<PathBuf> {
        let path = resolver
            .resolve(runtime_path, fallback_name)
            .map_err(|err| {
                chan_log!(self.config().log_level, error, error = %err, "failed to resolve socket path");
                err
            })?;
        self.connect_path(&path)?;
        Ok(path)
    }

    /// Connect to an explicit socket path. No retry.
    pub fn connect_path(&self, path: &Path) -> Result<()> {
        match self.handle.shared.socket.connect(path) {
            Ok(()) => Ok(()),
            Err(TransportError::Closed) => Err(ChannelError::Closed),
            Err(err) => {
                chan_log!(self.config().log_level, error, error = %err, "connect failed");
                Err(err.into())
            }
        }
    }

    /// Advance frame reassembly without blocking.
    ///
    /// Returns `Ok(Some(payload))` when a frame completes and `Ok(None)` when
    /// more bytes are needed. A malformed or oversized header, or a lost
    /// connection, destroys the channel before the error is returned; every
    /// later call then fails with [`ChannelError::Closed`].
    pub fn receive(&mut self) -> Result<Option<&[u8]>> {
        let shared = &self.handle.shared;
        let outcome = {
            let mut pinned = shared.socket.pin().map_err(|_| ChannelError::Closed)?;
            self.reader.poll_frame(&mut pinned)
        };

        match outcome {
            Ok(Some(_)) => Ok(Some(self.reader.payload())),
            Ok(None) => Ok(None),
            Err(_) if shared.socket.is_closed() => Err(ChannelError::Closed),
            Err(err) => {
                if err.is_protocol_violation() {
                    chan_log!(shared.config.log_level, error, error = %err, "protocol violation, closing channel");
                } else {
                    chan_log!(shared.config.log_level, error, error = %err, "connection lost, closing channel");
                }
                self.reader.reset();
                shared.socket.destroy();
                Err(err.into())
            }
        }
    }

    /// Payload of the most recently completed frame.
    pub fn payload(&self) -> &[u8] {
        self.reader.payload()
    }

    /// Reassembly progress of the frame currently on the wire.
    pub fn read_state(&self) -> ReadState {
        self.reader.state()
    }

    /// The thread-safe half of this channel.
    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.handle.send(payload)
    }

    pub fn wait(&self) -> Result<()> {
        self.handle.wait()
    }

    pub fn wait_for(&self, timeout: Duration) -> Result<()> {
        self.handle.wait_for(timeout)
    }

    pub fn destroy(&self) -> bool {
        self.handle.destroy()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn last_activity(&self) -> Instant {
        self.handle.last_activity()
    }

    pub fn config(&self) -> &ChannelConfig {
        self.handle.config()
    }
}
