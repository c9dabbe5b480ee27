//! Generic single-producer/single-consumer FIFO (C4).
//!
//! Grounded on `pcp/psi/fifo.c`: a contiguous element buffer with a
//! 4-byte-aligned per-element header carrying the element's used length,
//! and separate monotonically increasing read/write counters so empty and
//! full are distinguished without a wasted slot.
//!
//! `FIFO_MAX_INSTANCES = 4` in the original is a single file-scope array
//! shared by every subsystem that calls `fifo_create` — a hard total across
//! the whole system, not a per-subsystem budget (see DESIGN.md). This crate
//! keeps that invariant via [`crate::config::FIFO_MAX_INSTANCES`] and an
//! instance counter in [`Fifo::create`].

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::FIFO_MAX_INSTANCES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Full,
    Empty,
    ElementSizeOverflow,
    NoFreeInstance,
}

static LIVE_INSTANCES: AtomicUsize = AtomicUsize::new(0);

/// A handle returned by [`Fifo::create`]; dropping it releases the instance
/// slot, matching `fifo_destroy`.
pub struct InstanceToken(bool);

impl Drop for InstanceToken {
    fn drop(&mut self) {
        if self.0 {
            LIVE_INSTANCES.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Bounded element ring. `N` is the element capacity (`elemCount_p` in the
/// original); each element holds up to `CAP` bytes, rounded up to a 4-byte
/// boundary the way `elemSizeAlign` is computed in `fifo_create`.
pub struct Fifo<const CAP: usize, const N: usize> {
    buf: [(u32, [u8; CAP]); N],
    read: u32,
    write: u32,
    _token: InstanceToken,
}

impl<const CAP: usize, const N: usize> Fifo<CAP, N> {
    /// Creates one instance, consuming one of the
    /// [`crate::config::FIFO_MAX_INSTANCES`] system-wide slots.
    pub fn create() -> Result<Self, Error> {
        let mut cur = LIVE_INSTANCES.load(Ordering::Acquire);
        loop {
            if cur >= FIFO_MAX_INSTANCES {
                return Err(Error::NoFreeInstance);
            }
            match LIVE_INSTANCES.compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        Ok(Self {
            buf: [(0u32, [0u8; CAP]); N],
            read: 0,
            write: 0,
            _token: InstanceToken(true),
        })
    }

    fn occupied(&self) -> u32 {
        self.write.wrapping_sub(self.read)
    }

    /// Inserts one element, advancing the write counter. `N == 0` always
    /// returns `Full` (no UB, no division by element count).
    pub fn insert(&mut self, element: &[u8]) -> Result<(), Error> {
        if element.len() > CAP {
            return Err(Error::ElementSizeOverflow);
        }
        if N == 0 || self.occupied() as usize == N {
            return Err(Error::Full);
        }
        let slot = (self.write as usize) % N;
        self.buf[slot].0 = element.len() as u32;
        self.buf[slot].1[..element.len()].copy_from_slice(element);
        self.write = self.write.wrapping_add(1);
        Ok(())
    }

    /// Reads one element into `out`, advancing the read counter. Returns the
    /// number of bytes written into `out`.
    pub fn get(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if self.occupied() == 0 {
            return Err(Error::Empty);
        }
        let slot = (self.read as usize) % N;
        let len = self.buf[slot].0 as usize;
        out[..len].copy_from_slice(&self.buf[slot].1[..len]);
        self.read = self.read.wrapping_add(1);
        Ok(len)
    }

    /// Resets both counters, discarding all queued elements.
    pub fn flush(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    pub fn is_full(&self) -> bool {
        N != 0 && self.occupied() as usize == N
    }
}
