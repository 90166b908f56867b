use std::sync::{MutexGuard, OnceLock, TryLockError};
use std::time::Instant;

use framechan_channel::{Channel, ChannelConfig};

use crate::args;
use crate::error;
use crate::types::{log_level_arg, ChannelState, FramechanHandle};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Reference point for `framechan_last_activity_ns`.
pub(crate) fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

fn with_state<T>(handle: FramechanHandle, on_error: T, f: impl FnOnce(&ChannelState) -> T) -> T {
    if handle.is_null() {
        return error::set_invalid_argument("channel handle cannot be null", on_error);
    }

    let state = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &*(handle as *const ChannelState) }
    };

    f(state)
}

fn with_reader<T: Copy>(
    handle: FramechanHandle,
    on_error: T,
    f: impl FnOnce(&mut MutexGuard<'_, Channel>) -> T,
) -> T {
    with_state(handle, on_error, |state| {
        let mut reader = match state.reader.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                error::set_error_message("receive called concurrently on the same channel");
                return on_error;
            }
        };
        f(&mut reader)
    })
}

/// Allocate an unconnected channel.
///
/// `log_level` is one of the `FRAMECHAN_LOG_*` constants. Returns null on
/// failure; see `framechan_last_error`.
#[no_mangle]
pub extern "C" fn framechan_init(log_level: u32) -> FramechanHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();
        let _ = epoch();

        let Some(level) = log_level_arg(log_level) else {
            return error::set_invalid_argument(
                format!("unknown log level {log_level}"),
                std::ptr::null_mut(),
            );
        };

        match Channel::new(ChannelConfig::default().with_log_level(level)) {
            Ok(channel) => Box::into_raw(Box::new(ChannelState::new(channel))) as FramechanHandle,
            Err(err) => {
                error::record_channel_error(&err);
                std::ptr::null_mut()
            }
        }
    })
}

/// Destroy the channel and free the handle.
///
/// # Safety
/// `handle` must be null or a handle returned by `framechan_init`, and no
/// other call may be using it.
#[no_mangle]
pub unsafe extern "C" fn framechan_free(handle: FramechanHandle) {
    crate::ffi_boundary((), || {
        if handle.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by framechan_init.
        let state = unsafe { Box::from_raw(handle as *mut ChannelState) };
        state.shared.destroy();
    });
}

/// Shut the channel down. Safe to call from any thread, any number of times.
///
/// A thread blocked in `framechan_wait` returns once the socket is shut down.
///
/// # Safety
/// `handle` must be a valid handle returned by `framechan_init`.
#[no_mangle]
pub unsafe extern "C" fn framechan_destroy(handle: FramechanHandle) {
    crate::ffi_boundary((), || {
        with_state(handle, (), |state| {
            state.shared.destroy();
        })
    });
}

/// Resolve the service socket and connect to it.
///
/// # Safety
/// `handle` must be a valid handle. `runtime_path` and `fallback_name` must be
/// non-null UTF-8 C strings.
#[no_mangle]
pub unsafe extern "C" fn framechan_connect(
    handle: FramechanHandle,
    runtime_path: *const std::os::raw::c_char,
    fallback_name: *const std::os::raw::c_char,
) -> bool {
    crate::ffi_boundary(false, || {
        error::clear_error_state();

        let runtime_path = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(runtime_path, "runtime_path") } {
                Some(v) => v,
                None => return false,
            }
        };
        let fallback_name = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(fallback_name, "fallback_name") } {
                Some(v) => v,
                None => return false,
            }
        };

        with_reader(handle, false, |channel| {
            match channel.connect(runtime_path, fallback_name) {
                Ok(_) => true,
                Err(err) => {
                    error::record_channel_error(&err);
                    false
                }
            }
        })
    })
}

/// Block until the channel is readable or destroyed.
///
/// Returns false if the channel was already closed or polling failed.
///
/// # Safety
/// `handle` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn framechan_wait(handle: FramechanHandle) -> bool {
    crate::ffi_boundary(false, || {
        error::clear_error_state();

        with_state(handle, false, |state| match state.shared.wait() {
            Ok(()) => true,
            Err(err) => {
                error::record_channel_error(&err);
                false
            }
        })
    })
}

/// Send one frame. Safe to call from several threads at once.
///
/// # Safety
/// `handle` must be a valid handle. If `len > 0`, `data` must be non-null and
/// readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn framechan_send(
    handle: FramechanHandle,
    data: *const u8,
    len: usize,
) -> bool {
    crate::ffi_boundary(false, || {
        error::clear_error_state();

        let payload = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::bytes_arg(data, len, "data") } {
                Some(v) => v,
                None => return false,
            }
        };

        with_state(handle, false, |state| match state.shared.send(payload) {
            Ok(()) => true,
            Err(err) => {
                error::record_channel_error(&err);
                false
            }
        })
    })
}

/// Advance frame reassembly without blocking.
///
/// Returns the payload length of a completed frame, or 0 if no frame is ready
/// or the channel failed (`framechan_last_error` is non-empty in that case).
/// Single reader only.
///
/// # Safety
/// `handle` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn framechan_receive(handle: FramechanHandle) -> u32 {
    crate::ffi_boundary(0, || {
        error::clear_error_state();

        with_reader(handle, 0, |channel| match channel.receive() {
            Ok(Some(payload)) => payload.len() as u32,
            Ok(None) => 0,
            Err(err) => {
                error::record_channel_error(&err);
                0
            }
        })
    })
}

/// Payload of the most recently completed frame.
///
/// The pointer stays valid until the next `framechan_receive` or
/// `framechan_free` on this handle.
///
/// # Safety
/// `handle` must be a valid handle. `out_len` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn framechan_payload(
    handle: FramechanHandle,
    out_len: *mut usize,
) -> *const u8 {
    crate::ffi_boundary(std::ptr::null(), || {
        with_reader(handle, std::ptr::null(), |channel| {
            let payload = channel.payload();
            if !out_len.is_null() {
                // SAFETY: Pointer was checked for null above.
                unsafe {
                    *out_len = payload.len();
                }
            }
            payload.as_ptr()
        })
    })
}

/// Monotonic nanoseconds, relative to library initialization, at which the
/// last frame header was parsed. Returns -1 for a null handle.
///
/// # Safety
/// `handle` must be a valid handle.
#[no_mangle]
pub unsafe extern "C" fn framechan_last_activity_ns(handle: FramechanHandle) -> i64 {
    crate::ffi_boundary(-1, || {
        with_state(handle, -1, |state| {
            let since = state.shared.last_activity().saturating_duration_since(epoch());
            i64::try_from(since.as_nanos()).unwrap_or(i64::MAX)
        })
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, CString};
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use framechan_channel::LogLevel;

    use super::*;
    use crate::types::FRAMECHAN_LOG_OFF;

    fn last_error() -> String {
        // SAFETY: framechan_last_error returns this thread's live CString.
        unsafe { CStr::from_ptr(crate::framechan_last_error()) }
            .to_string_lossy()
            .into_owned()
    }

    fn connected_handle() -> (FramechanHandle, UnixStream) {
        let (left, right) = UnixStream::pair().unwrap();
        right
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let channel = Channel::from_stream(
            left,
            ChannelConfig::default().with_log_level(LogLevel::Off),
        );
        let handle = Box::into_raw(Box::new(ChannelState::new(channel))) as FramechanHandle;
        (handle, right)
    }

    #[test]
    fn init_rejects_unknown_level() {
        assert!(framechan_init(42).is_null());
        assert!(last_error().contains("unknown log level"));

        let handle = framechan_init(FRAMECHAN_LOG_OFF);
        assert!(!handle.is_null());
        // SAFETY: handle came from framechan_init.
        unsafe { framechan_free(handle) };
    }

    #[test]
    fn null_handle_is_an_invalid_argument() {
        // SAFETY: null handles are rejected before use.
        unsafe {
            assert!(!framechan_wait(std::ptr::null_mut()));
            assert!(last_error().contains("invalid argument"));
            assert_eq!(framechan_receive(std::ptr::null_mut()), 0);
            assert_eq!(framechan_last_activity_ns(std::ptr::null_mut()), -1);
            framechan_destroy(std::ptr::null_mut());
            framechan_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn send_and_receive_through_handle() {
        let (handle, mut peer) = connected_handle();

        // SAFETY: handle is live until framechan_free below.
        unsafe {
            assert!(framechan_send(handle, b"ping".as_ptr(), 4));
            let mut wire = [0u8; 8];
            peer.read_exact(&mut wire).unwrap();
            assert_eq!(&wire, &[8, 0, 0, 0, b'p', b'i', b'n', b'g']);

            assert_eq!(framechan_receive(handle), 0);
            assert!(last_error().is_empty());

            peer.write_all(&[7, 0, 0, 0, b'a', b'c', b'k']).unwrap();
            assert!(framechan_wait(handle));
            assert_eq!(framechan_receive(handle), 3);

            let mut len = 0usize;
            let ptr = framechan_payload(handle, &mut len);
            assert_eq!(std::slice::from_raw_parts(ptr, len), b"ack");
            assert!(framechan_last_activity_ns(handle) >= 0);

            framechan_free(handle);
        }
    }

    #[test]
    fn protocol_violation_reports_and_closes() {
        let (handle, mut peer) = connected_handle();
        peer.write_all(&[2, 0, 0, 0]).unwrap();

        // SAFETY: handle is live until framechan_free below.
        unsafe {
            assert_eq!(framechan_receive(handle), 0);
            assert!(last_error().contains("malformed"), "{}", last_error());
            assert!(!framechan_send(handle, b"x".as_ptr(), 1));
            assert_eq!(last_error(), "channel closed");
            framechan_free(handle);
        }
    }

    #[test]
    fn destroy_from_another_thread_unblocks_wait() {
        let (handle, _peer) = connected_handle();
        let addr = handle as usize;

        let waiter = std::thread::spawn(move || {
            // SAFETY: handle outlives this thread; freed after join.
            unsafe { framechan_wait(addr as FramechanHandle) }
        });
        std::thread::sleep(Duration::from_millis(30));

        // SAFETY: handle is live until framechan_free below.
        unsafe {
            framechan_destroy(handle);
            framechan_destroy(handle);
        }
        assert!(waiter.join().unwrap());

        // SAFETY: all other users have returned.
        unsafe {
            assert_eq!(framechan_receive(handle), 0);
            assert_eq!(last_error(), "channel closed");
            framechan_free(handle);
        }
    }

    #[test]
    fn concurrent_receive_is_reported() {
        let (handle, _peer) = connected_handle();
        let state = {
            // SAFETY: handle is live until framechan_free below.
            unsafe { &*(handle as *const ChannelState) }
        };

        let held = state.reader.lock().unwrap();
        // SAFETY: handle is live; the reader lock is held to simulate a second reader.
        assert_eq!(unsafe { framechan_receive(handle) }, 0);
        assert!(last_error().contains("concurrently"));
        drop(held);

        // SAFETY: no other users remain.
        unsafe { framechan_free(handle) };
    }

    #[test]
    fn connect_requires_strings() {
        let handle = framechan_init(FRAMECHAN_LOG_OFF);
        let fallback = CString::new("svc/ipc.sock").unwrap();

        // SAFETY: handle came from framechan_init; fallback outlives the call.
        unsafe {
            assert!(!framechan_connect(handle, std::ptr::null(), fallback.as_ptr()));
            assert!(last_error().contains("runtime_path cannot be null"));
            framechan_free(handle);
        }
    }
}
