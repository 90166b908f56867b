//! framechan-ffi: C-ABI exports for the framechan client channel.
//!
//! A handle from `framechan_init` is shared between one reader thread
//! (`framechan_receive`, `framechan_payload`) and any number of threads calling
//! `framechan_send`, `framechan_wait` and `framechan_destroy`.

mod args;
mod channel;
mod error;
mod types;

use std::panic::AssertUnwindSafe;

pub use channel::{
    framechan_connect, framechan_destroy, framechan_free, framechan_init,
    framechan_last_activity_ns, framechan_payload, framechan_receive, framechan_send,
    framechan_wait,
};
pub use types::{
    FramechanHandle, FRAMECHAN_LOG_DEBUG, FRAMECHAN_LOG_ERROR, FRAMECHAN_LOG_INFO,
    FRAMECHAN_LOG_OFF, FRAMECHAN_LOG_TRACE, FRAMECHAN_LOG_WARN,
};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

/// Message for the last failed call on this thread; empty after a success.
#[no_mangle]
pub extern "C" fn framechan_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    #[test]
    fn last_error_returns_non_null_pointer() {
        error::clear_error_state();
        let ptr = framechan_last_error();
        assert!(!ptr.is_null());

        // SAFETY: framechan_last_error returns a pointer to a thread-local CString.
        let text = unsafe { CStr::from_ptr(ptr).to_str().unwrap() };
        assert!(text.is_empty());
    }

    #[test]
    fn panics_are_contained() {
        let value = ffi_boundary(7, || panic!("boom"));
        assert_eq!(value, 7);

        // SAFETY: framechan_last_error returns a pointer to a thread-local CString.
        let text = unsafe { CStr::from_ptr(framechan_last_error()).to_str().unwrap() };
        assert_eq!(text, "panic across FFI boundary");
    }
}
