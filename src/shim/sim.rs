//! In-memory model of a kqueue, used to drive the shim in unit tests.
//!
//! Knotes are keyed by `(ident, filter)`. Readiness is kept apart from
//! registrations so a descriptor can become ready before it is added,
//! exactly like with the real kernel.

use super::kevent::{Filter, Flags, Kernel, Kevent};
use super::saved_errno;
use crate::sys::unix::errno;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::time::Duration;

type Key = (usize, Filter);

struct Knote {
    udata: u64,
    enabled: bool,
    clear: bool,
    dispatch: bool,
    oneshot: bool,
    /// Set once an edge-triggered knote delivered the current signal.
    consumed: bool,
}

#[derive(Clone, Copy, Default)]
struct Signal {
    eof: bool,
    fflags: u32,
    /// Errno delivered with `EV_ERROR`, if any.
    error: Option<i32>,
}

/// How the next receipt for an ident is altered.
#[derive(Clone, Copy)]
enum Fault {
    Errno(i32),
    /// A receipt without `EV_ERROR`.
    Bare,
}

#[derive(Default)]
struct Queue {
    knotes: BTreeMap<Key, Knote>,
    signals: BTreeMap<Key, Signal>,
    closed: BTreeSet<usize>,
    faults: BTreeMap<usize, Fault>,
    fail: Option<i32>,
    calls: usize,
}

impl Queue {
    fn apply(&mut self, change: &Kevent) -> Result<(), i32> {
        let key = (change.ident, change.filter);

        match change.filter {
            Filter::Read | Filter::Write if self.closed.contains(&change.ident) => {
                return Err(libc::EBADF);
            }
            Filter::Other(_) => return Err(libc::EINVAL),
            _ => {}
        }

        if change.flags.contains(Flags::DELETE) {
            return self.knotes.remove(&key).map(|_| ()).ok_or(libc::ENOENT);
        }

        let knote = if change.flags.contains(Flags::ADD) {
            let knote = self.knotes.entry(key).or_insert(Knote {
                udata: 0,
                enabled: true,
                clear: false,
                dispatch: false,
                oneshot: false,
                consumed: false,
            });

            knote.udata = change.udata;
            knote.enabled = true;
            knote.clear = change.flags.contains(Flags::CLEAR);
            knote.dispatch = change.flags.contains(Flags::DISPATCH);
            knote.oneshot = change.flags.contains(Flags::ONESHOT);
            knote
        } else {
            let knote = self.knotes.get_mut(&key).ok_or(libc::ENOENT)?;
            knote.udata = change.udata;
            knote
        };

        if change.flags.contains(Flags::ENABLE) {
            knote.enabled = true;
        }
        if change.flags.contains(Flags::DISABLE) {
            knote.enabled = false;
        }

        Ok(())
    }

    fn scan(&mut self, events: &mut [Kevent]) -> usize {
        let Queue {
            knotes, signals, ..
        } = self;

        let mut n = 0;
        let mut fired = Vec::new();

        for (key, knote) in knotes.iter_mut() {
            if n == events.len() {
                break;
            }
            if !knote.enabled || (knote.clear && knote.consumed) {
                continue;
            }
            let Some(signal) = signals.get(key) else {
                continue;
            };

            let mut flags = Flags::empty();
            if signal.eof {
                flags |= Flags::EOF;
            }
            if signal.error.is_some() {
                flags |= Flags::ERROR;
            }

            events[n] = Kevent {
                ident: key.0,
                filter: key.1,
                flags,
                fflags: signal.fflags,
                data: signal.error.unwrap_or(0) as i64,
                udata: knote.udata,
            };
            n += 1;

            if knote.clear {
                knote.consumed = true;
            }
            if knote.dispatch {
                knote.enabled = false;
            }
            if knote.oneshot {
                fired.push(*key);
            }
        }

        for key in fired {
            knotes.remove(&key);
        }

        n
    }
}

/// A kqueue living entirely in process memory.
pub(crate) struct SimKernel {
    queue: RefCell<Queue>,
}

impl SimKernel {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(Queue::default()),
        }
    }

    /// Marks `(ident, filter)` ready, re-arming edge-triggered knotes.
    pub(crate) fn signal(&self, ident: usize, filter: Filter) {
        self.raise(ident, filter, Signal::default());
    }

    /// Marks `(ident, filter)` as having reached end-of-file.
    pub(crate) fn signal_eof(&self, ident: usize, filter: Filter, fflags: u32) {
        let signal = Signal {
            eof: true,
            fflags,
            ..Signal::default()
        };
        self.raise(ident, filter, signal);
    }

    /// Makes `(ident, filter)` deliver `EV_ERROR` carrying `code`.
    pub(crate) fn signal_error(&self, ident: usize, filter: Filter, code: i32) {
        let signal = Signal {
            error: Some(code),
            ..Signal::default()
        };
        self.raise(ident, filter, signal);
    }

    fn raise(&self, ident: usize, filter: Filter, signal: Signal) {
        let mut queue = self.queue.borrow_mut();
        queue.signals.insert((ident, filter), signal);

        if let Some(knote) = queue.knotes.get_mut(&(ident, filter)) {
            knote.consumed = false;
        }
    }

    /// Clears the readiness of `(ident, filter)`.
    pub(crate) fn drain(&self, ident: usize, filter: Filter) {
        self.queue.borrow_mut().signals.remove(&(ident, filter));
    }

    /// Closes `ident`: its filters vanish and new ones fail with `EBADF`.
    pub(crate) fn close(&self, ident: usize) {
        let mut queue = self.queue.borrow_mut();
        queue.closed.insert(ident);
        queue.knotes.remove(&(ident, Filter::Read));
        queue.knotes.remove(&(ident, Filter::Write));
    }

    /// Makes the next receipt for `ident` carry `code`, whatever the
    /// change did.
    pub(crate) fn fail_receipt(&self, ident: usize, code: i32) {
        self.queue.borrow_mut().faults.insert(ident, Fault::Errno(code));
    }

    /// Makes the next receipt for `ident` come back without `EV_ERROR`.
    pub(crate) fn strip_receipt(&self, ident: usize) {
        self.queue.borrow_mut().faults.insert(ident, Fault::Bare);
    }

    /// Makes the next `kevent` call fail as a whole with `code`.
    pub(crate) fn fail_next(&self, code: i32) {
        self.queue.borrow_mut().fail = Some(code);
    }

    pub(crate) fn is_registered(&self, ident: usize, filter: Filter) -> bool {
        self.queue.borrow().knotes.contains_key(&(ident, filter))
    }

    pub(crate) fn is_enabled(&self, ident: usize, filter: Filter) -> Option<bool> {
        self.queue
            .borrow()
            .knotes
            .get(&(ident, filter))
            .map(|knote| knote.enabled)
    }

    /// Number of live knotes, markers included.
    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().knotes.len()
    }

    /// Number of `kevent` calls issued so far.
    pub(crate) fn calls(&self) -> usize {
        self.queue.borrow().calls
    }
}

impl Kernel for SimKernel {
    fn kevent(
        &self,
        changes: &[Kevent],
        events: &mut [Kevent],
        _timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let mut queue = self.queue.borrow_mut();
        queue.calls += 1;

        if let Some(code) = queue.fail.take() {
            saved_errno::set(code);
            return Err(errno(code));
        }

        let mut n = 0;
        for change in changes {
            let mut code = match queue.apply(change) {
                Ok(()) => 0,
                Err(code) => code,
            };
            let mut flags = Flags::ERROR;

            if change.flags.contains(Flags::RECEIPT) {
                match queue.faults.remove(&change.ident) {
                    Some(Fault::Errno(fault)) => code = fault,
                    Some(Fault::Bare) => flags = Flags::empty(),
                    None => {}
                }
            } else if code == 0 {
                continue;
            }

            if n < events.len() {
                events[n] = Kevent {
                    flags,
                    data: code as i64,
                    fflags: 0,
                    ..*change
                };
                n += 1;
            } else if code != 0 {
                saved_errno::set(code);
                return Err(errno(code));
            }
        }

        if n > 0 {
            return Ok(n);
        }

        Ok(queue.scan(events))
    }

    fn wait(
        &self,
        max: usize,
        _timeout: Option<Duration>,
        sink: &mut dyn FnMut(&Kevent),
    ) -> io::Result<usize> {
        let mut raw = vec![Kevent::default(); max];

        let n = {
            let mut queue = self.queue.borrow_mut();
            queue.calls += 1;

            if let Some(code) = queue.fail.take() {
                saved_errno::set(code);
                return Err(errno(code));
            }
            queue.scan(&mut raw)
        };

        for kev in &raw[..n] {
            sink(kev);
        }

        Ok(n)
    }
}
