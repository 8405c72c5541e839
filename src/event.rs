//! Event masks, control operations and the `epoll_event` counterpart.
//!
//! The numeric values of every flag and operation are the ones Linux
//! uses, so code written against `<sys/epoll.h>` can pass its constants
//! through unchanged on every backend.

use crate::sys::unix::errno;

use bitflags::bitflags;
use std::io;

bitflags! {
    /// Readiness and registration flags of an epoll event.
    ///
    /// The same set is used as an interest mask when registering a
    /// descriptor and as the readiness mask reported by `wait`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Events: u32 {
        /// The descriptor is readable.
        const IN = 0x001;
        /// Urgent data is available.
        const PRI = 0x002;
        /// The descriptor is writable.
        const OUT = 0x004;
        /// An error condition happened on the descriptor.
        const ERR = 0x008;
        /// Hang up.
        const HUP = 0x010;
        const RDNORM = 0x040;
        const RDBAND = 0x080;
        const WRNORM = 0x100;
        const WRBAND = 0x200;
        const MSG = 0x400;
        /// The peer closed its writing half of the connection.
        const RDHUP = 0x2000;
        /// Disarm the registration after one notification.
        const ONESHOT = 1 << 30;
        /// Edge-triggered notification.
        const ET = 1 << 31;
    }
}

impl Events {
    /// Flags accepted in the interest mask of `ADD` and `MOD`.
    pub const SUPPORTED: Events = Events::IN
        .union(Events::PRI)
        .union(Events::OUT)
        .union(Events::ERR)
        .union(Events::HUP)
        .union(Events::RDHUP)
        .union(Events::ONESHOT)
        .union(Events::ET);
}

impl Default for Events {
    fn default() -> Self {
        Events::empty()
    }
}

pub const EPOLLIN: u32 = Events::IN.bits();
pub const EPOLLPRI: u32 = Events::PRI.bits();
pub const EPOLLOUT: u32 = Events::OUT.bits();
pub const EPOLLERR: u32 = Events::ERR.bits();
pub const EPOLLHUP: u32 = Events::HUP.bits();
pub const EPOLLRDNORM: u32 = Events::RDNORM.bits();
pub const EPOLLRDBAND: u32 = Events::RDBAND.bits();
pub const EPOLLWRNORM: u32 = Events::WRNORM.bits();
pub const EPOLLWRBAND: u32 = Events::WRBAND.bits();
pub const EPOLLMSG: u32 = Events::MSG.bits();
pub const EPOLLRDHUP: u32 = Events::RDHUP.bits();
pub const EPOLLONESHOT: u32 = Events::ONESHOT.bits();
pub const EPOLLET: u32 = Events::ET.bits();

pub const EPOLL_CTL_ADD: i32 = Op::Add as i32;
pub const EPOLL_CTL_DEL: i32 = Op::Del as i32;
pub const EPOLL_CTL_MOD: i32 = Op::Mod as i32;

/// Flag accepted by [`Epoll::create1`](crate::Epoll::create1).
pub const EPOLL_CLOEXEC: i32 = 0o2000000;

/// An `epoll_ctl` operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Op {
    /// Register a descriptor.
    Add = 1,
    /// Remove a descriptor. Never fails for an unknown descriptor.
    Del = 2,
    /// Change the interest mask of a registered descriptor.
    Mod = 3,
}

impl TryFrom<i32> for Op {
    type Error = io::Error;

    /// Converts a raw `EPOLL_CTL_*` value, failing with `EINVAL` for
    /// anything else.
    fn try_from(op: i32) -> io::Result<Self> {
        match op {
            EPOLL_CTL_ADD => Ok(Op::Add),
            EPOLL_CTL_DEL => Ok(Op::Del),
            EPOLL_CTL_MOD => Ok(Op::Mod),
            _ => Err(errno(libc::EINVAL)),
        }
    }
}

/// An interest mask or readiness report paired with an opaque tag.
///
/// This is the counterpart of C's `struct epoll_event`. The tag is
/// handed back verbatim by `wait`; it is never interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Event {
    events: Events,
    data: u64,
}

impl Event {
    /// Creates an event from a flag set and a tag.
    pub const fn new(events: Events, data: u64) -> Self {
        Self { events, data }
    }

    /// Creates an event from a raw mask.
    ///
    /// Unknown bits are kept so that `ctl` can reject them.
    pub const fn from_raw(events: u32, data: u64) -> Self {
        Self {
            events: Events::from_bits_retain(events),
            data,
        }
    }

    /// Returns the flag set.
    pub fn events(&self) -> Events {
        self.events
    }

    /// Returns the tag attached at registration time.
    pub fn data(&self) -> u64 {
        self.data
    }

    pub fn is_readable(&self) -> bool {
        self.events.contains(Events::IN)
    }

    pub fn is_writable(&self) -> bool {
        self.events.contains(Events::OUT)
    }

    pub fn is_error(&self) -> bool {
        self.events.contains(Events::ERR)
    }

    pub fn is_hup(&self) -> bool {
        self.events.contains(Events::HUP)
    }

    /// Returns `true` when the peer shut down its writing half.
    ///
    /// Only reported for registrations that asked for [`Events::RDHUP`].
    pub fn is_read_closed(&self) -> bool {
        self.events.contains(Events::RDHUP)
    }
}
