use crate::epoll::Epoll;
use crate::sys::unix::errno;

use std::io;

/// Builder for configuring and creating an [`Epoll`] instance.
///
/// By default the size hint is `1` and the descriptor is close-on-exec,
/// which is what `epoll_create1(EPOLL_CLOEXEC)` gives.
///
/// # Examples
///
/// ```rust,no_run
/// use kqepoll::EpollBuilder;
///
/// let epoll = EpollBuilder::new()
///     .close_on_exec(false)
///     .build()?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EpollBuilder {
    /// Size hint of `epoll_create`. Only its sign matters.
    size: i32,
    /// Whether the descriptor is closed across `execve`.
    close_on_exec: bool,
}

impl EpollBuilder {
    /// Creates a new `EpollBuilder` with default configuration.
    pub fn new() -> Self {
        Self {
            size: 1,
            close_on_exec: true,
        }
    }

    /// Sets the size hint.
    ///
    /// The kernel ignores it; a value that is not positive makes
    /// [`build`](Self::build) fail with `EINVAL`.
    pub fn size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    /// Sets whether the descriptor is closed across `execve`.
    pub fn close_on_exec(mut self, close_on_exec: bool) -> Self {
        self.close_on_exec = close_on_exec;
        self
    }

    /// Creates the instance with the configured options.
    pub fn build(self) -> io::Result<Epoll> {
        if self.size <= 0 {
            return Err(errno(libc::EINVAL));
        }

        Epoll::open(self.close_on_exec)
    }
}

impl Default for EpollBuilder {
    /// Creates a default `EpollBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
