use std::io::{self, IoSlice};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::guard::{FdGuard, Pin};

#[cfg(not(target_vendor = "apple"))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_STREAM | libc::SOCK_CLOEXEC;
#[cfg(target_vendor = "apple")]
const SOCKET_TYPE: libc::c_int = libc::SOCK_STREAM;

// Apple targets have no MSG_NOSIGNAL; SO_NOSIGPIPE is set on the socket instead.
#[cfg(not(target_vendor = "apple"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(target_vendor = "apple")]
const SEND_FLAGS: libc::c_int = 0;

// Half-close (peer `shutdown(SHUT_WR)`) is only reported separately on Linux.
#[cfg(any(target_os = "linux", target_os = "android"))]
const RDHUP_EVENTS: libc::c_short = libc::POLLRDHUP;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RDHUP_EVENTS: libc::c_short = 0;

/// Maximum socket path length, including the trailing NUL.
/// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS and the BSDs.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub const MAX_PATH_LEN: usize = 108;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub const MAX_PATH_LEN: usize = 104;

/// Client-side Unix domain stream socket behind an [`FdGuard`].
///
/// All methods take `&self`; the socket can be shared across threads and
/// destroyed from any of them while others are inside [`Pinned`] calls.
#[derive(Debug)]
pub struct UnixSocket {
    guard: FdGuard,
}

impl UnixSocket {
    /// Allocate an unconnected socket.
    pub fn new() -> Result<Self> {
        // SAFETY: plain socket(2) call with constant arguments.
        let raw = unsafe { libc::socket(libc::AF_UNIX, SOCKET_TYPE, 0) };
        if raw == -1 {
            return Err(TransportError::Resource(io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        #[cfg(target_vendor = "apple")]
        set_no_sigpipe(&fd).map_err(TransportError::Resource)?;

        Ok(Self {
            guard: FdGuard::new(fd),
        })
    }

    /// Adopt an already-connected stream (socket pairs, inherited descriptors).
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            guard: FdGuard::new(OwnedFd::from(stream)),
        }
    }

    /// Connect to a listening socket at `path` (blocking).
    pub fn connect(&self, path: &Path) -> Result<()> {
        let (addr, len) = socket_addr(path)?;
        let pinned = self.pin()?;

        // SAFETY: `addr` is a fully initialised sockaddr_un of `len` bytes and the
        // descriptor is pinned open.
        let rc = unsafe {
            libc::connect(
                pinned.fd(),
                (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        };
        if rc != 0 {
            return Err(TransportError::Connect {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        debug!(?path, "connected to unix domain socket");
        Ok(())
    }

    /// Pin the descriptor for one I/O call.
    pub fn pin(&self) -> Result<Pinned<'_>> {
        self.guard
            .pin()
            .map(|pin| Pinned { pin })
            .ok_or(TransportError::Closed)
    }

    /// Shut the socket down and close it once in-flight calls finish.
    ///
    /// Returns `true` only for the call that released the descriptor.
    pub fn destroy(&self) -> bool {
        let released = self.guard.release();
        if released {
            debug!("unix domain socket destroyed");
        }
        released
    }

    /// Whether the socket has been destroyed.
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    /// Number of calls currently pinning the descriptor.
    pub fn pin_count(&self) -> usize {
        self.guard.pin_count()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

/// Socket I/O performed while the descriptor is pinned open.
#[derive(Debug)]
pub struct Pinned<'a> {
    pin: Pin<'a>,
}

impl Pinned<'_> {
    /// The pinned descriptor.
    pub fn fd(&self) -> RawFd {
        self.pin.fd()
    }

    /// Block until the socket is readable, hung up, or `timeout` elapses.
    ///
    /// Returns `Ok(false)` only on timeout. An interrupted poll counts as ready.
    pub fn poll_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.map_or(-1, poll_timeout_ms);

        // SAFETY: `pollfd` is a valid single-element array for the call duration.
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(true);
            }
            return Err(err);
        }
        Ok(ready > 0)
    }

    /// Whether the peer has closed its write side (non-blocking).
    ///
    /// Bytes already buffered stay readable after a hangup; this only
    /// reports that no more will arrive.
    pub fn peer_hung_up(&self) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.fd(),
            events: libc::POLLIN | RDHUP_EVENTS,
            revents: 0,
        };

        // SAFETY: `pollfd` is a valid single-element array for the call duration.
        let ready = unsafe { libc::poll(&mut pollfd, 1, 0) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(pollfd.revents & (libc::POLLHUP | RDHUP_EVENTS) != 0)
    }

    /// Copy pending bytes without consuming them (non-blocking).
    pub fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, libc::MSG_PEEK | libc::MSG_DONTWAIT)
    }

    /// Consume pending bytes (non-blocking).
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, libc::MSG_DONTWAIT)
    }

    /// Send all slices in one `sendmsg` call without raising SIGPIPE.
    ///
    /// Returns the byte count the kernel accepted, which may be short.
    pub fn send_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        // SAFETY: an all-zero msghdr is a valid "no name, no control" header.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        // IoSlice is ABI-compatible with iovec on Unix; sendmsg does not write through it.
        msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;

        // SAFETY: `msg` references `bufs`, which outlives the call.
        let sent = unsafe { libc::sendmsg(self.fd(), &msg, SEND_FLAGS) };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }

    fn recv_with_flags(&self, buf: &mut [u8], flags: libc::c_int) -> io::Result<usize> {
        // SAFETY: `buf` is writable for `buf.len()` bytes.
        let read = unsafe {
            libc::recv(
                self.fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                flags,
            )
        };
        if read < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(read as usize)
    }
}

/// Reject paths that do not fit in `sockaddr_un.sun_path`.
pub fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len == 0 || len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN - 1,
        });
    }
    Ok(())
}

fn socket_addr(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t)> {
    check_path_len(path)?;

    // SAFETY: sockaddr_un is plain old data; zero is a valid bit pattern.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr
        .sun_path
        .iter_mut()
        .zip(path.as_os_str().as_bytes().iter())
    {
        *dst = *src as libc::c_char;
    }

    let len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
    Ok((addr, len))
}

fn poll_timeout_ms(timeout: Duration) -> libc::c_int {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}

#[cfg(target_vendor = "apple")]
fn set_no_sigpipe(fd: &OwnedFd) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let enable: libc::c_int = 1;
    // SAFETY: `enable` is a valid c_int for the duration of the call.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            (&enable as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
