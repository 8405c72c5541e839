//! Portable view of `struct kevent` and the kernel seam the shim drives.

use bitflags::bitflags;
use std::io;
use std::time::Duration;

bitflags! {
    /// Action and status flags of a kevent.
    ///
    /// The values are the ones shared by Darwin and the BSDs.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct Flags: u16 {
        const ADD = 0x0001;
        const DELETE = 0x0002;
        const ENABLE = 0x0004;
        const DISABLE = 0x0008;
        const ONESHOT = 0x0010;
        const CLEAR = 0x0020;
        const RECEIPT = 0x0040;
        /// Disable the filter after each delivery.
        const DISPATCH = 0x0080;
        const ERROR = 0x4000;
        const EOF = 0x8000;
    }
}

/// Kernel filter a kevent is attached to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Filter {
    #[default]
    Read,
    Write,
    /// User-triggered events, used as state markers.
    User,
    /// Any filter the shim never registers.
    #[cfg_attr(
        not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")),
        allow(dead_code)
    )]
    Other(i16),
}

/// A change submitted to, or an event returned by, the kernel queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Kevent {
    pub(crate) ident: usize,
    pub(crate) filter: Filter,
    pub(crate) flags: Flags,
    pub(crate) fflags: u32,
    pub(crate) data: i64,
    pub(crate) udata: u64,
}

impl Kevent {
    pub(crate) fn new(ident: usize, filter: Filter, flags: Flags, udata: u64) -> Self {
        Self {
            ident,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata,
        }
    }

    /// Returns the errno carried by a receipt, `0` meaning success.
    ///
    /// Returns `None` if this is not a receipt.
    pub(crate) fn receipt(&self) -> Option<i32> {
        if self.flags.contains(Flags::ERROR) {
            Some(self.data as i32)
        } else {
            None
        }
    }
}

impl Default for Kevent {
    fn default() -> Self {
        Self::new(0, Filter::Read, Flags::empty(), 0)
    }
}

/// A kernel event queue.
///
/// `kevent` applies `changes` in order, then fills `events` with either
/// the receipts of those changes or pending events, exactly like
/// `kevent(2)`. A `timeout` of `None` blocks until an event arrives.
pub(crate) trait Kernel {
    fn kevent(
        &self,
        changes: &[Kevent],
        events: &mut [Kevent],
        timeout: Option<Duration>,
    ) -> io::Result<usize>;

    /// Waits for at most `max` pending events and hands each one to
    /// `sink`, in kernel order. Returns how many were handed out.
    ///
    /// `sink` runs after the kernel call returned and may call back into
    /// the queue.
    fn wait(
        &self,
        max: usize,
        timeout: Option<Duration>,
        sink: &mut dyn FnMut(&Kevent),
    ) -> io::Result<usize>;
}
