//! # kqepoll
//!
//! **kqepoll** provides the Linux `epoll` interface on systems that only
//! have `kqueue` (macOS, iOS, FreeBSD), so that event-loop code written
//! against epoll runs there unchanged.
//!
//! An [`Epoll`] is a plain kqueue descriptor. Registration state that
//! epoll keeps per descriptor and kqueue does not, such as whether the
//! descriptor is registered or whether `EPOLLRDHUP` was requested, is
//! stored inside the kqueue itself as user-filter markers. Nothing is
//! kept in process memory, so duplicated descriptors share everything.
//!
//! On Linux the same API is a thin passthrough to the native syscalls.
//!
//! - `EPOLLIN` / `EPOLLOUT` map to the read and write filters
//! - `EPOLLET` maps to `EV_CLEAR`
//! - `EPOLLONESHOT` maps to `EV_DISPATCH`, re-armed by `EPOLL_CTL_MOD`
//! - `EPOLLRDHUP` is reported on read end-of-file when requested
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kqepoll::{Epoll, Event, Events};
//! use std::os::fd::AsRawFd;
//! use std::os::unix::net::UnixStream;
//!
//! let (a, b) = UnixStream::pair()?;
//! let epoll = Epoll::create1(kqepoll::EPOLL_CLOEXEC)?;
//!
//! epoll.add(a.as_raw_fd(), Events::IN | Events::RDHUP, 7)?;
//! drop(b);
//!
//! let mut events = [Event::default(); 16];
//! let n = epoll.wait(&mut events, -1)?;
//!
//! for event in &events[..n] {
//!     if event.is_read_closed() {
//!         println!("peer of {} hung up", event.data());
//!     }
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Logging
//!
//! Instance creation and closing are logged at `debug` level, `ctl` and
//! `wait` calls at `trace` level, through the [`log`] facade.

mod builder;
mod epoll;
mod event;
mod sys;

#[cfg(any(
    test,
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
))]
mod shim;

pub use builder::EpollBuilder;
pub use epoll::{BACKEND, Epoll, MAX_FD};
pub use event::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP,
    EPOLLIN, EPOLLMSG, EPOLLONESHOT, EPOLLOUT, EPOLLPRI, EPOLLRDBAND, EPOLLRDHUP, EPOLLRDNORM,
    EPOLLWRBAND, EPOLLWRNORM, Event, Events, Op,
};
