//! The epoll contract emulated on a kqueue.
//!
//! Every registered descriptor always owns two kernel filters, one per
//! direction; `ctl` only flips them between enabled and disabled, so a
//! `MOD` never needs to know which direction was active before. What
//! epoll keeps per registration but kqueue cannot (whether the
//! descriptor is registered at all, and whether `EPOLLRDHUP` was asked
//! for) lives in the flag word managed by [`state`].
//!
//! The shim holds no memory besides the kernel handle. Two threads may
//! call into the same queue; nothing orders a `ctl` against the flag
//! lookups of a concurrent `wait`.

pub(crate) mod kevent;
pub(crate) mod state;

mod saved_errno;

#[cfg(test)]
pub(crate) mod sim;

use crate::event::{Event, Events, Op};
use crate::sys::unix::errno;
use kevent::{Filter, Flags, Kernel, Kevent};
use state::State;

use log::warn;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// An epoll instance backed by a kernel event queue.
pub(crate) struct Shim<K> {
    kernel: K,
}

impl<K: Kernel> Shim<K> {
    pub(crate) fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub(crate) fn kernel(&self) -> &K {
        &self.kernel
    }

    pub(crate) fn into_kernel(self) -> K {
        self.kernel
    }

    /// Applies an `epoll_ctl` operation.
    ///
    /// `fd` must already be validated against the key width. A kernel
    /// error is returned as is; when one of the two filters was applied
    /// and the other was not, the registration is left as the kernel
    /// left it.
    pub(crate) fn ctl(&self, op: Op, fd: RawFd, event: Option<&Event>) -> io::Result<()> {
        let key = fd as u32;

        let event = match op {
            Op::Del => {
                self.submit(fd, Flags::DELETE, Flags::DELETE, 0)?;
                return state::store(&self.kernel, key, State::empty());
            }
            Op::Add | Op::Mod => event.ok_or_else(|| errno(libc::EINVAL))?,
        };
        let interest = event.events();

        let mut state = state::load(&self.kernel, key)?;
        let mut flags = Flags::empty();

        if op == Op::Add {
            if state.contains(State::REGISTERED) {
                return Err(errno(libc::EEXIST));
            }
            state = State::REGISTERED;
            flags |= Flags::ADD;
        }

        if interest.contains(Events::ET) {
            flags |= Flags::CLEAR;
        }
        if interest.contains(Events::ONESHOT) {
            flags |= Flags::DISPATCH;
        }
        state.set(State::RDHUP, interest.contains(Events::RDHUP));

        let toggle = |wanted: bool| {
            if wanted {
                flags | Flags::ENABLE
            } else {
                flags | Flags::DISABLE
            }
        };

        self.submit(
            fd,
            toggle(interest.contains(Events::IN)),
            toggle(interest.contains(Events::OUT)),
            event.data(),
        )?;

        state::store(&self.kernel, key, state)
    }

    /// Submits the read and write filters of `fd` in one call, each with
    /// its own receipt.
    ///
    /// On deletion a missing filter, or a descriptor the kernel already
    /// dropped on close, is not an error.
    fn submit(&self, fd: RawFd, read: Flags, write: Flags, udata: u64) -> io::Result<()> {
        let ident = fd as usize;
        let deleting = read.contains(Flags::DELETE);

        let changes = [
            Kevent::new(ident, Filter::Read, read | Flags::RECEIPT, udata),
            Kevent::new(ident, Filter::Write, write | Flags::RECEIPT, udata),
        ];
        let mut receipts = [Kevent::default(); 2];

        let n = self.kernel.kevent(&changes, &mut receipts, None)?;

        for receipt in &receipts[..n] {
            debug_assert!(receipt.receipt().is_some(), "kevent returned a non-receipt");

            match receipt.receipt() {
                None | Some(0) => {}
                Some(libc::ENOENT) | Some(libc::EBADF) if deleting => {}
                Some(code) => return Err(errno(code)),
            }
        }

        Ok(())
    }

    /// Waits for events and translates them into `events`.
    ///
    /// Returns the number of filled entries; `0` means the timeout
    /// expired.
    pub(crate) fn wait(&self, events: &mut [Event], timeout: Option<Duration>) -> io::Result<usize> {
        let mut slots = events.iter_mut();

        self.kernel.wait(slots.len(), timeout, &mut |kev| {
            if let Some(slot) = slots.next() {
                *slot = self.translate(kev);
            }
        })
    }

    fn translate(&self, kev: &Kevent) -> Event {
        let mut events = Events::empty();

        match kev.filter {
            Filter::Read => events |= Events::IN,
            Filter::Write => events |= Events::OUT,
            _ => {}
        }

        if kev.flags.contains(Flags::ERROR) {
            events |= Events::ERR;
        }

        if kev.flags.contains(Flags::EOF) {
            if kev.fflags != 0 {
                events |= Events::ERR;
            }

            if kev.filter == Filter::Read {
                match state::load(&self.kernel, kev.ident as u32) {
                    Ok(state) if state.contains(State::RDHUP) => events |= Events::RDHUP,
                    Ok(_) => {}
                    Err(err) => warn!("cannot read flags of fd {}: {}", kev.ident, err),
                }
            }
        }

        Event::new(events, kev.udata)
    }
}
