//! Linux `epoll`-based backend.
//!
//! Linux has the real thing, so this backend forwards every call to the
//! native syscalls. Arguments are validated by the caller exactly as on
//! the kqueue backend; the only adjustment made here is that `DEL` of
//! a descriptor epoll does not know is not an error.

use crate::event::{Event, Op};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, epoll_create1, epoll_ctl,
    epoll_event, epoll_wait,
};
use log::debug;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

/// Native Linux `epoll` instance.
pub(crate) struct EpollSelector {
    epoll: OwnedFd,
}

impl EpollSelector {
    /// Creates the epoll instance.
    pub(crate) fn open(close_on_exec: bool) -> io::Result<Self> {
        let flags = if close_on_exec { EPOLL_CLOEXEC } else { 0 };

        let epoll = unsafe { epoll_create1(flags) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!("created epoll {}", epoll);
        Ok(Self {
            epoll: unsafe { OwnedFd::from_raw_fd(epoll) },
        })
    }

    /// Duplicates the epoll descriptor.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            epoll: self.epoll.try_clone()?,
        })
    }

    /// Applies an `epoll_ctl` operation.
    pub(crate) fn ctl(&self, op: Op, fd: RawFd, event: Option<&Event>) -> io::Result<()> {
        let native_op = match op {
            Op::Add => EPOLL_CTL_ADD,
            Op::Del => EPOLL_CTL_DEL,
            Op::Mod => EPOLL_CTL_MOD,
        };

        let mut native = event.map(|event| epoll_event {
            events: event.events().bits(),
            u64: event.data(),
        });
        let native_ptr = native
            .as_mut()
            .map_or(ptr::null_mut(), |event| event as *mut epoll_event);

        let rc = unsafe { epoll_ctl(self.epoll.as_raw_fd(), native_op, fd, native_ptr) };
        if rc < 0 {
            let err = io::Error::last_os_error();

            if op == Op::Del && matches!(err.raw_os_error(), Some(libc::ENOENT | libc::EBADF)) {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }

    /// Waits for readiness events.
    ///
    /// Blocks until at least one descriptor is ready or the timeout
    /// expires. Returns the number of filled entries.
    pub(crate) fn wait(&self, events: &mut [Event], timeout: Option<Duration>) -> io::Result<usize> {
        let max = events.len().min(libc::c_int::MAX as usize);
        let mut native: Vec<epoll_event> = Vec::with_capacity(max);

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                native.as_mut_ptr(),
                max as libc::c_int,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        unsafe {
            native.set_len(n as usize);
        }

        for (event, ev) in events.iter_mut().zip(&native) {
            let (mask, data) = (ev.events, ev.u64);
            *event = Event::from_raw(mask, data);
        }

        Ok(n as usize)
    }
}

/// Converts a timeout to epoll milliseconds, rounding up so that a
/// short non-zero timeout never turns into a busy poll.
fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => {
            let mut ms = t.as_millis();
            if t.subsec_nanos() % 1_000_000 != 0 {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

impl AsFd for EpollSelector {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.epoll.as_fd()
    }
}

impl AsRawFd for EpollSelector {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll.as_raw_fd()
    }
}

impl From<OwnedFd> for EpollSelector {
    fn from(epoll: OwnedFd) -> Self {
        Self { epoll }
    }
}

impl From<EpollSelector> for OwnedFd {
    fn from(selector: EpollSelector) -> Self {
        selector.epoll
    }
}
