use crate::builder::EpollBuilder;
use crate::event::{EPOLL_CLOEXEC, Event, Events, Op};
use crate::sys::Selector;
use crate::sys::unix::{errno, sys_close};

use log::{debug, trace};
use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Highest descriptor number that can be registered.
///
/// The kqueue backend packs two flag bits above the descriptor in a
/// 32-bit marker ident, leaving 30 bits for the descriptor itself. The
/// same limit is applied on every backend.
pub const MAX_FD: RawFd = (1 << 30) - 1;

/// Name of the backend selected at build time: `"kqueue"` or `"epoll"`.
pub const BACKEND: &str = crate::sys::BACKEND;

/// Checks the arguments of an `epoll_ctl` call before the kernel sees
/// them.
pub(crate) fn validate(op: Op, fd: RawFd, event: Option<&Event>) -> io::Result<()> {
    if op != Op::Del {
        let event = event.ok_or_else(|| errno(libc::EINVAL))?;
        if !Events::SUPPORTED.contains(event.events()) {
            return Err(errno(libc::EINVAL));
        }
    }

    if !(0..=MAX_FD).contains(&fd) {
        return Err(errno(libc::EBADF));
    }

    Ok(())
}

/// Converts an epoll millisecond timeout, negative meaning forever.
fn timeout_from_ms(timeout: i32) -> Option<Duration> {
    u64::try_from(timeout).ok().map(Duration::from_millis)
}

/// An epoll instance.
///
/// On Linux this is a native epoll descriptor. On macOS, iOS and
/// FreeBSD it is a kqueue driven so that `ctl` and `wait` behave like
/// epoll, `EPOLLRDHUP`, `EPOLLET` and `EPOLLONESHOT` included.
///
/// The instance holds nothing but its descriptor: dropping it closes
/// the descriptor, and [`try_clone`](Self::try_clone) yields a handle
/// that shares every registration.
///
/// # Examples
///
/// ```rust,no_run
/// use kqepoll::{Epoll, Event, Events};
/// use std::os::fd::AsRawFd;
/// use std::os::unix::net::UnixStream;
///
/// let (a, mut b) = UnixStream::pair()?;
/// let epoll = Epoll::create(1)?;
/// epoll.add(a.as_raw_fd(), Events::IN | Events::RDHUP, 42)?;
///
/// std::io::Write::write_all(&mut b, b"ping")?;
///
/// let mut events = [Event::default(); 8];
/// let n = epoll.wait(&mut events, 1000)?;
/// assert_eq!(events[..n][0].data(), 42);
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct Epoll {
    selector: Selector,
}

impl Epoll {
    /// Creates an epoll instance, like `epoll_create(2)`.
    ///
    /// `size` is only checked to be positive, as on Linux. The
    /// descriptor is not close-on-exec.
    ///
    /// # Errors
    ///
    /// `EINVAL` if `size <= 0`, before any syscall is made; otherwise
    /// the error of the underlying `kqueue(2)` or `epoll_create1(2)`.
    pub fn create(size: i32) -> io::Result<Epoll> {
        EpollBuilder::new().size(size).close_on_exec(false).build()
    }

    /// Creates an epoll instance, like `epoll_create1(2)`.
    ///
    /// `flags` is `0` or [`EPOLL_CLOEXEC`]; anything else fails with
    /// `EINVAL`.
    pub fn create1(flags: i32) -> io::Result<Epoll> {
        if flags & !EPOLL_CLOEXEC != 0 {
            return Err(errno(libc::EINVAL));
        }

        EpollBuilder::new()
            .close_on_exec(flags & EPOLL_CLOEXEC != 0)
            .build()
    }

    pub(crate) fn open(close_on_exec: bool) -> io::Result<Epoll> {
        let selector = Selector::open(close_on_exec)?;
        Ok(Epoll { selector })
    }

    /// Adds, modifies or removes the registration of `fd`, like
    /// `epoll_ctl(2)`.
    ///
    /// `event` is required for [`Op::Add`] and [`Op::Mod`] and ignored
    /// for [`Op::Del`].
    ///
    /// # Errors
    ///
    /// - `EINVAL`: missing event, or flags outside [`Events::SUPPORTED`].
    /// - `EBADF`: `fd` is negative or above [`MAX_FD`].
    /// - `EEXIST`: `fd` is already registered ([`Op::Add`]).
    /// - any error reported by the kernel, unchanged.
    ///
    /// `Op::Del` succeeds for a descriptor that is not registered. If
    /// the kernel rejects an `Add` or `Mod` half way through, the
    /// registration of `fd` is unspecified; issue an `Op::Del` before
    /// trying again.
    pub fn ctl(&self, op: Op, fd: RawFd, event: Option<&Event>) -> io::Result<()> {
        validate(op, fd, event)?;

        trace!(
            "ctl {:?} fd={} events={:?}",
            op,
            fd,
            event.map(|event| event.events())
        );
        self.selector.ctl(op, fd, event)
    }

    /// Registers `fd` with the given interest and tag.
    pub fn add(&self, fd: RawFd, events: Events, data: u64) -> io::Result<()> {
        self.ctl(Op::Add, fd, Some(&Event::new(events, data)))
    }

    /// Replaces the interest of a registered `fd`.
    ///
    /// This is also how a descriptor disarmed by [`Events::ONESHOT`] is
    /// armed again.
    pub fn modify(&self, fd: RawFd, events: Events, data: u64) -> io::Result<()> {
        self.ctl(Op::Mod, fd, Some(&Event::new(events, data)))
    }

    /// Removes `fd`. Succeeds if `fd` was not registered.
    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(Op::Del, fd, None)
    }

    /// Waits for events, like `epoll_wait(2)`.
    ///
    /// At most `events.len()` entries are filled. A negative `timeout`
    /// blocks until an event arrives; otherwise it is in milliseconds.
    /// Returns the number of filled entries, `0` if the timeout expired.
    ///
    /// # Errors
    ///
    /// `EINVAL` if `events` is empty; otherwise the error of the
    /// blocking syscall (`EINTR` included), with no partial results.
    pub fn wait(&self, events: &mut [Event], timeout: i32) -> io::Result<usize> {
        self.wait_timeout(events, timeout_from_ms(timeout))
    }

    /// Same as [`wait`](Self::wait) with a [`Duration`] timeout,
    /// `None` blocking forever.
    pub fn wait_timeout(&self, events: &mut [Event], timeout: Option<Duration>) -> io::Result<usize> {
        if events.is_empty() {
            return Err(errno(libc::EINVAL));
        }

        let n = self.selector.wait(events, timeout)?;

        trace!("wait returned {} events", n);
        Ok(n)
    }

    /// Waits for events into a reusable buffer.
    ///
    /// The capacity of `events` is the maximum number of events
    /// returned; its previous contents are discarded.
    pub fn poll(&self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        let capacity = events.capacity();

        events.clear();
        events.resize(capacity, Event::default());

        let result = self.wait_timeout(events, timeout);
        events.truncate(*result.as_ref().unwrap_or(&0));

        result.map(|_| ())
    }

    /// Creates a new handle to the same instance.
    pub fn try_clone(&self) -> io::Result<Epoll> {
        Ok(Epoll {
            selector: self.selector.try_clone()?,
        })
    }

    /// Returns the backend in use, see [`BACKEND`].
    pub fn backend(&self) -> &'static str {
        BACKEND
    }

    /// Closes the instance, reporting the error of `close(2)`.
    ///
    /// Dropping an `Epoll` closes it too, ignoring that error.
    pub fn close(self) -> io::Result<()> {
        let fd = self.into_raw_fd();

        debug!("closing {} {}", BACKEND, fd);
        sys_close(fd)
    }
}

impl fmt::Debug for Epoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epoll")
            .field("fd", &self.selector.as_raw_fd())
            .field("backend", &BACKEND)
            .finish()
    }
}

impl AsFd for Epoll {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.selector.as_fd()
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.selector.as_raw_fd()
    }
}

impl IntoRawFd for Epoll {
    fn into_raw_fd(self) -> RawFd {
        OwnedFd::from(self.selector).into_raw_fd()
    }
}

impl FromRawFd for Epoll {
    /// Adopts an existing epoll (or kqueue) descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must be an open descriptor of the backend's kind, owned by
    /// the caller and not used through any other owner afterwards.
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Epoll {
            selector: Selector::from(fd),
        }
    }
}

impl From<Epoll> for OwnedFd {
    fn from(epoll: Epoll) -> Self {
        OwnedFd::from(epoll.selector)
    }
}
