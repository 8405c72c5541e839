//! Per-descriptor flag word stored inside the kernel queue.
//!
//! `kqueue` has no slot for caller state next to a registration, and
//! keeping a side table would break as soon as the queue descriptor is
//! duplicated. Instead each bit of the word is an `EVFILT_USER` marker
//! whose ident is the descriptor with the bit index packed above it:
//! the marker exists when the bit is set. User markers are never
//! triggered, so they never show up in `wait`.

use super::kevent::{Filter, Flags, Kernel, Kevent};
use super::saved_errno;
use crate::sys::unix::errno;

use bitflags::bitflags;
use std::io;

/// Number of bits in a flag word.
pub(crate) const VAL_BITS: u32 = 2;

/// Bits left for the descriptor in a marker ident.
pub(crate) const KEY_BITS: u32 = 32 - VAL_BITS;

pub(crate) const KEY_MASK: u32 = (1 << KEY_BITS) - 1;

bitflags! {
    /// Flag word of one descriptor.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct State: u16 {
        /// An `ADD` succeeded and no `DEL` followed.
        const REGISTERED = 0x0001;
        /// The caller asked for `EPOLLRDHUP`.
        const RDHUP = 0x0002;
    }
}

/// Ident of the marker holding bit `bit` of `key`.
pub(crate) fn marker(key: u32, bit: u32) -> usize {
    (key | ((1 << bit) << KEY_BITS)) as usize
}

fn check_key(key: u32) -> io::Result<()> {
    if key & !KEY_MASK != 0 {
        return Err(errno(libc::EINVAL));
    }
    Ok(())
}

/// Writes the flag word of `key`.
///
/// Every marker is added first and then deleted again when its bit is
/// clear, so one batched call works whatever the previous word was.
/// The calling thread's `errno` is left untouched.
pub(crate) fn store<K: Kernel>(kernel: &K, key: u32, state: State) -> io::Result<()> {
    check_key(key)?;
    if !State::all().contains(state) {
        return Err(errno(libc::EINVAL));
    }

    let mut changes = [Kevent::default(); 2 * VAL_BITS as usize];
    let mut n = 0;

    for bit in 0..VAL_BITS {
        let ident = marker(key, bit);

        changes[n] = Kevent::new(ident, Filter::User, Flags::ADD, 0);
        n += 1;

        if state.bits() & (1 << bit) == 0 {
            changes[n] = Kevent::new(ident, Filter::User, Flags::DELETE, 0);
            n += 1;
        }
    }

    saved_errno::preserve(|| kernel.kevent(&changes[..n], &mut [], None)).map(|_| ())
}

/// Reads the flag word of `key` without modifying any marker.
pub(crate) fn load<K: Kernel>(kernel: &K, key: u32) -> io::Result<State> {
    check_key(key)?;

    let mut changes = [Kevent::default(); VAL_BITS as usize];
    for (bit, change) in (0..VAL_BITS).zip(changes.iter_mut()) {
        *change = Kevent::new(marker(key, bit), Filter::User, Flags::RECEIPT, 0);
    }

    let mut receipts = [Kevent::default(); VAL_BITS as usize];
    let n = kernel.kevent(&changes, &mut receipts, None)?;

    let mut state = State::empty();
    for receipt in &receipts[..n] {
        let ident = receipt.ident as u32;
        if ident & KEY_MASK != key {
            return Err(errno(libc::EINVAL));
        }

        match receipt.receipt() {
            Some(0) => state |= State::from_bits_retain((ident >> KEY_BITS) as u16),
            Some(libc::ENOENT) => {}
            _ => return Err(errno(libc::EINVAL)),
        }
    }

    Ok(state)
}
