//! In-memory fakes of the [`super`] traits, used by unit tests across this
//! crate instead of touching real hardware.

use core::cell::Cell;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use super::{DelayMs, HardwareCounter, SerialError, SerialLink};

/// A free-running counter the test advances explicitly.
#[derive(Default)]
pub struct MockCounter {
    ticks: Cell<u32>,
}

impl MockCounter {
    pub fn advance(&self, delta: u16) {
        self.ticks.set(self.ticks.get().wrapping_add(delta as u32));
    }
}

impl HardwareCounter for MockCounter {
    fn ticks(&self) -> u32 {
        self.ticks.get()
    }
}

/// A delay that just records the requested amount, for deterministic tests.
#[derive(Default)]
pub struct MockDelay {
    pub total_ms: u32,
}

impl DelayMs for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
    }
}

/// A loopback-capable serial link backed by fixed-size queues, standing in
/// for the inter-processor UART in boot-protocol tests.
pub struct MockSerial {
    pub inbox: heapless::Deque<u8, 256>,
    pub outbox: heapless::Vec<u8, 256>,
    pub fail_write: bool,
    pub starve_read: bool,
}

impl Default for MockSerial {
    fn default() -> Self {
        Self {
            inbox: heapless::Deque::new(),
            outbox: heapless::Vec::new(),
            fail_write: false,
            starve_read: false,
        }
    }
}

impl MockSerial {
    pub fn push_inbound(&mut self, data: &[u8]) {
        for &b in data {
            let _ = self.inbox.push_back(b);
        }
    }
}

impl SerialLink for MockSerial {
    type Error = ();

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        if self.fail_write {
            return Err(());
        }
        for &b in buf {
            let _ = self.outbox.push(b);
        }
        Ok(())
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<(), SerialError> {
        if self.starve_read || self.inbox.len() < buf.len() {
            return Err(SerialError::Timeout);
        }
        for slot in buf.iter_mut() {
            *slot = self.inbox.pop_front().ok_or(SerialError::Receive)?;
        }
        Ok(())
    }
}

/// A RAM-backed NOR flash fake sized like a single sector, for [`crate::nvs`] tests.
pub struct MockFlash<const SIZE: usize> {
    pub data: [u8; SIZE],
}

impl<const SIZE: usize> MockFlash<SIZE> {
    pub fn new() -> Self {
        Self { data: [0xFFu8; SIZE] }
    }
}

#[derive(Debug)]
pub struct MockFlashError;

impl NorFlashError for MockFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl<const SIZE: usize> ErrorType for MockFlash<SIZE> {
    type Error = MockFlashError;
}

impl<const SIZE: usize> ReadNorFlash for MockFlash<SIZE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize> NorFlash for MockFlash<SIZE> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        for b in &mut self.data[from as usize..to as usize] {
            *b = 0xFF;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
