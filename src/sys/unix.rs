use std::io;
use std::os::fd::RawFd;

/// Builds an [`io::Error`] from a raw errno value.
pub(crate) fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// Closes a file descriptor, reporting the `close(2)` error.
pub(crate) fn sys_close(fd: RawFd) -> io::Result<()> {
    let rc = unsafe { libc::close(fd) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Sets the close-on-exec flag on a file descriptor.
#[cfg_attr(target_os = "linux", allow(dead_code))]
pub(crate) fn sys_set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
