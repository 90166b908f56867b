//! Pinned Unix-domain socket handle for a single client connection.
//!
//! This is the lowest layer of framechan:
//! - [`FdGuard`] keeps a descriptor alive while any thread is using it and
//!   lets another thread tear it down at any moment
//! - [`UnixSocket`] wraps the guard with connect/poll/recv/sendmsg
//! - [`SocketResolver`] finds the service socket in the runtime directory or
//!   the user data directory

#[cfg(not(unix))]
compile_error!("framechan-transport requires a Unix target");

pub mod error;
pub mod guard;
pub mod resolver;
pub mod socket;

pub use error::{Result, TransportError};
pub use guard::{FdGuard, Pin};
pub use resolver::{is_socket, Candidate, CandidateSource, ResolverEnv, SocketResolver};
pub use socket::{check_path_len, Pinned, UnixSocket, MAX_PATH_LEN};
