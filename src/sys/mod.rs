//! Platform-specific event queue backends.
//!
//! On BSD-family systems the epoll contract is emulated on top of
//! `kqueue`; on Linux the native `epoll` syscalls are used directly.
//! Both backends expose the same inherent methods through the
//! [`Selector`] alias, picked at compile time.

pub(crate) mod unix;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
mod kqueue;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub(crate) type Selector = kqueue::KqueueSelector;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub(crate) const BACKEND: &str = "kqueue";

#[cfg(target_os = "linux")]
pub(crate) type Selector = epoll::EpollSelector;

#[cfg(target_os = "linux")]
pub(crate) const BACKEND: &str = "epoll";
