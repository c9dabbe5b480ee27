//! Platform abstraction (C1): scoped access to GPIO, the inter-processor
//! UART link, a microsecond timer, interrupt control and flash — everything
//! the MCU-vendor HAL would otherwise expose directly.
//!
//! This module defines traits instead of binding to one vendor's PAC, the
//! way the rest of this crate treats the HAL as an external collaborator
//! (spec.md §1). A target crate implements these over its concrete HAL
//! (`embedded-hal`'s `OutputPin`/`SpiBus` and friends cover most of it
//! already; the remainder — the hardware counter and NVIC access — are
//! narrow enough to define locally).

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

#[cfg(test)]
pub mod mock;

pub mod io_link;

/// A single push-pull output pin, e.g. for the chaser-light GPIO demo app
/// this core feeds. Re-exports `embedded_hal::digital::OutputPin` rather
/// than redefining it.
pub use embedded_hal::digital::{InputPin, OutputPin};

/// The free-running 16-bit hardware counter backing the consecutive time
/// base (C15). Implementations read a live timer register; `process` must
/// be driven often enough that the 16-bit counter cannot wrap twice between
/// calls (spec.md §4.13).
pub trait HardwareCounter {
    /// Current value of the free-running counter (full width; only the low
    /// 16 bits are significant to the consecutive-time extension).
    fn ticks(&self) -> u32;
}

/// NVIC-equivalent interrupt control, scoped to the one sync interrupt this
/// core cares about.
pub trait InterruptCtrl {
    /// Enables the sync interrupt.
    fn enable_sync_irq(&mut self);
    /// Disables the sync interrupt.
    fn disable_sync_irq(&mut self);
    /// True if the sync interrupt is currently pending.
    fn sync_irq_pending(&self) -> bool;
    /// Clears the pending sync interrupt.
    fn clear_sync_irq(&mut self);
}

/// Millisecond-granularity delay, used by the ping/pong boot protocol
/// (spec.md §4.10) and nowhere in the cyclic path.
pub trait DelayMs {
    fn delay_ms(&mut self, ms: u32);
}

/// Inter-processor UART link (uP-Master ↔ uP-Slave), framed as a raw byte
/// stream per spec.md §6. A bespoke trait rather than `embedded_io::Read`/
/// `Write` directly, since those have no notion of a receive timeout and the
/// boot protocol (C12) needs one on both the master's unbounded wait and the
/// slave's per-attempt retry; [`io_link::EmbeddedIoSerial`] adapts any
/// blocking `embedded_io` port (what a target's concrete UART driver
/// implements, the way the teacher's `Uart` does) into this trait by
/// layering a poll-based timeout on top.
pub trait SerialLink {
    type Error: core::fmt::Debug;

    /// Blocking write of the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Blocking read of the whole buffer, waiting at most `timeout_ms`
    /// milliseconds in total. A `timeout_ms` of `0` means wait forever (used
    /// by the handshake master, spec.md §4.10).
    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), SerialError>;
}

/// The subset of `SerialLink` failure modes this core needs to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialError {
    Timeout,
    Transmit,
    Receive,
}

/// NVS persistence backend (C19): a NOR-flash-shaped device holding the
/// persisted SOD. Re-uses `embedded_storage`'s traits directly, the way the
/// teacher's own `flash::Flash` driver implements them for XPI NOR — the
/// word/halfword/byte promotion policy of spec.md §6 lives in [`crate::nvs`]
/// on top of this trait, not in the trait itself.
pub trait NvsBackend: ReadNorFlash + NorFlash {}

impl<T: ReadNorFlash + NorFlash> NvsBackend for T {}
