use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use framechan_channel::ChannelError;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized)
            .unwrap_or_else(|_| c"internal error".to_owned());
    });
}

/// Record an invalid-argument message and return `on_error` for chaining.
pub(crate) fn set_invalid_argument<T>(message: impl Into<String>, on_error: T) -> T {
    set_error_message(format!("invalid argument: {}", message.into()));
    on_error
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn record_channel_error(err: &ChannelError) {
    set_error_message(err.to_string());
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
