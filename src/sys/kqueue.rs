//! `kqueue`-based backend.
//!
//! This module owns the kqueue descriptor and converts between the
//! shim's portable [`Kevent`] and `libc::kevent`. All epoll semantics
//! live in the shim; nothing here keeps state besides the descriptor.

use super::unix::sys_set_cloexec;
use crate::shim::Shim;
use crate::shim::kevent::{Filter, Flags, Kernel, Kevent};
use crate::sys::unix::errno;

use log::debug;
use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

/// The epoll shim running on a real kqueue.
pub(crate) type KqueueSelector = Shim<Kqueue>;

/// Upper bound on the changes, and receipts, the shim handles in one call.
const MAX_CHANGES: usize = 4;

/// Portable flags and their native counterparts.
const FLAGS: [(Flags, u16); 10] = [
    (Flags::ADD, libc::EV_ADD as u16),
    (Flags::DELETE, libc::EV_DELETE as u16),
    (Flags::ENABLE, libc::EV_ENABLE as u16),
    (Flags::DISABLE, libc::EV_DISABLE as u16),
    (Flags::ONESHOT, libc::EV_ONESHOT as u16),
    (Flags::CLEAR, libc::EV_CLEAR as u16),
    (Flags::RECEIPT, libc::EV_RECEIPT as u16),
    (Flags::DISPATCH, libc::EV_DISPATCH as u16),
    (Flags::ERROR, libc::EV_ERROR as u16),
    (Flags::EOF, libc::EV_EOF as u16),
];

/// A kqueue descriptor.
pub(crate) struct Kqueue {
    fd: OwnedFd,
}

impl Kqueue {
    fn new(close_on_exec: bool) -> io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        let fd = unsafe { OwnedFd::from_raw_fd(kq) };
        if close_on_exec {
            sys_set_cloexec(fd.as_raw_fd())?;
        }

        debug!("created kqueue {}", kq);
        Ok(Self { fd })
    }
}

fn to_native(kev: &Kevent) -> libc::kevent {
    let mut native: libc::kevent = unsafe { mem::zeroed() };

    native.ident = kev.ident as _;
    native.filter = match kev.filter {
        Filter::Read => libc::EVFILT_READ,
        Filter::Write => libc::EVFILT_WRITE,
        Filter::User => libc::EVFILT_USER,
        Filter::Other(filter) => filter,
    };
    native.flags = FLAGS
        .iter()
        .filter(|(flag, _)| kev.flags.contains(*flag))
        .fold(0, |acc, (_, bit)| acc | bit);
    native.fflags = kev.fflags;
    native.data = kev.data as _;
    native.udata = kev.udata as usize as *mut libc::c_void;

    native
}

fn from_native(native: &libc::kevent) -> Kevent {
    let filter = match native.filter {
        libc::EVFILT_READ => Filter::Read,
        libc::EVFILT_WRITE => Filter::Write,
        libc::EVFILT_USER => Filter::User,
        other => Filter::Other(other),
    };
    let flags = FLAGS
        .iter()
        .filter(|(_, bit)| native.flags & bit != 0)
        .fold(Flags::empty(), |acc, (flag, _)| acc | *flag);

    Kevent {
        ident: native.ident as usize,
        filter,
        flags,
        fflags: native.fflags,
        data: native.data as i64,
        udata: native.udata as usize as u64,
    }
}

impl Kqueue {
    /// Issues one `kevent(2)` call on native records.
    fn submit(
        &self,
        changes: &[libc::kevent],
        events: &mut [libc::kevent],
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let timespec = timeout.map(|t| {
            let mut ts: libc::timespec = unsafe { mem::zeroed() };
            ts.tv_sec = t.as_secs().min(libc::time_t::MAX as u64) as libc::time_t;
            ts.tv_nsec = t.subsec_nanos() as _;
            ts
        });
        let timespec_ptr = timespec
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const libc::timespec);

        let n = unsafe {
            libc::kevent(
                self.fd.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as libc::c_int,
                events.as_mut_ptr(),
                events.len().min(libc::c_int::MAX as usize) as libc::c_int,
                timespec_ptr,
            )
        };

        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(n as usize)
    }
}

impl Kernel for Kqueue {
    fn kevent(
        &self,
        changes: &[Kevent],
        events: &mut [Kevent],
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        if changes.len() > MAX_CHANGES || events.len() > MAX_CHANGES {
            return Err(errno(libc::EINVAL));
        }

        let mut native_changes: [libc::kevent; MAX_CHANGES] = unsafe { mem::zeroed() };
        for (native, change) in native_changes.iter_mut().zip(changes) {
            *native = to_native(change);
        }

        let mut native_events: [libc::kevent; MAX_CHANGES] = unsafe { mem::zeroed() };
        let n = self.submit(
            &native_changes[..changes.len()],
            &mut native_events[..events.len()],
            timeout,
        )?;

        for (event, native) in events.iter_mut().zip(&native_events[..n]) {
            *event = from_native(native);
        }

        Ok(n)
    }

    fn wait(
        &self,
        max: usize,
        timeout: Option<Duration>,
        sink: &mut dyn FnMut(&Kevent),
    ) -> io::Result<usize> {
        let mut native: Vec<libc::kevent> = vec![unsafe { mem::zeroed() }; max];
        let n = self.submit(&[], &mut native, timeout)?;

        for event in &native[..n] {
            sink(&from_native(event));
        }

        Ok(n)
    }
}

impl Shim<Kqueue> {
    /// Creates a kqueue-backed epoll instance.
    pub(crate) fn open(close_on_exec: bool) -> io::Result<Self> {
        Ok(Shim::new(Kqueue::new(close_on_exec)?))
    }

    /// Duplicates the kqueue descriptor.
    ///
    /// The flag words live in the kqueue itself, so the clone sees every
    /// registration made through either handle.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        Ok(Shim::new(Kqueue {
            fd: self.kernel().fd.try_clone()?,
        }))
    }
}

impl AsFd for Shim<Kqueue> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.kernel().fd.as_fd()
    }
}

impl AsRawFd for Shim<Kqueue> {
    fn as_raw_fd(&self) -> RawFd {
        self.kernel().fd.as_raw_fd()
    }
}

impl From<OwnedFd> for Shim<Kqueue> {
    fn from(fd: OwnedFd) -> Self {
        Shim::new(Kqueue { fd })
    }
}

impl From<Shim<Kqueue>> for OwnedFd {
    fn from(shim: Shim<Kqueue>) -> Self {
        shim.into_kernel().fd
    }
}
