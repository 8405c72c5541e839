use libc::c_int;

#[cfg(target_os = "linux")]
fn location() -> *mut c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn location() -> *mut c_int {
    unsafe { libc::__error() }
}

/// Runs `f` and restores the calling thread's `errno` afterwards.
///
/// Any error `f` hits must already be captured in its return value.
pub(crate) fn preserve<R>(f: impl FnOnce() -> R) -> R {
    let saved = unsafe { *location() };
    let result = f();
    unsafe { *location() = saved };
    result
}

#[cfg(test)]
pub(crate) fn get() -> c_int {
    unsafe { *location() }
}

#[cfg(test)]
pub(crate) fn set(code: c_int) {
    unsafe { *location() = code };
}
