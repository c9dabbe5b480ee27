//! Non-volatile storage (C19): persists the SOD image across a power cycle.
//!
//! Grounded on `sn/nvs.c` (stm32f401rb variant). `nvs_write` there chunks the
//! write into decreasing sizes — word while 4 or more bytes remain, halfword
//! for a 2- or 3-byte remainder, byte for the last one — because the STM32
//! flash controller only accepts word/halfword/byte program operations and a
//! misaligned trailing word would read past the caller's buffer. This crate
//! sits on top of [`embedded_storage::nor_flash::NorFlash`] instead of a
//! vendor HAL, so a single `write()` call can already take any byte count;
//! the chunking is kept anyway; it is the caller-visible contract
//! (`ReadyMsgInvalid`-style strictness: promote down, never read past the
//! end of `data`) rather than a controller necessity on every target.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::platform::NvsBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    OutOfBounds,
    Write,
    Read,
    Erase,
}

/// Offset of the stored SOD image within the backing device, mirroring
/// `FLASH_IMAGE_OFFSET` in the original.
pub const IMAGE_OFFSET: u32 = 0;

/// Non-volatile store for the persisted SOD image. `base` plays the role of
/// `imageBaseAddr_l`, computed once at construction instead of lazily by
/// `nvs_init`, since this crate has no global init/close lifecycle.
pub struct Nvs<B: NvsBackend> {
    backend: B,
    base: u32,
}

impl<B: NvsBackend> Nvs<B> {
    pub fn new(backend: B, offset: u32) -> Self {
        Self { backend, base: offset }
    }

    /// `nvs_write`: programs `data` at `offset`, word-preferred with
    /// halfword/byte fallback for the tail.
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }

        let mut address = self.base.checked_add(offset).ok_or(Error::OutOfBounds)?;
        let end = address.checked_add(data.len() as u32).ok_or(Error::OutOfBounds)?;
        if end as usize > self.backend.capacity() {
            return Err(Error::OutOfBounds);
        }
        let mut remaining = data;

        while !remaining.is_empty() {
            let chunk_len = if remaining.len() >= 4 {
                4
            } else if remaining.len() >= 2 {
                2
            } else {
                1
            };
            let (chunk, rest) = remaining.split_at(chunk_len);
            self.backend.write(address, chunk).map_err(|_| Error::Write)?;
            address = address.checked_add(chunk_len as u32).ok_or(Error::OutOfBounds)?;
            remaining = rest;
        }

        Ok(())
    }

    /// `nvs_readUint32`-equivalent, generalized to an arbitrary length read
    /// into `out` rather than handing back a raw pointer into flash.
    pub fn read(&mut self, offset: u32, out: &mut [u8]) -> Result<(), Error> {
        let address = self.base.checked_add(offset).ok_or(Error::OutOfBounds)?;
        self.backend.read(address, out).map_err(|_| Error::Read)
    }

    /// `nvs_erase`: erases the single region covering `len` bytes from
    /// `offset`. Unlike the STM32 target, which erases a whole sector
    /// regardless of `len`, this rounds up to the backend's erase
    /// granularity so non-sectored targets (e.g. a RAM-backed test double)
    /// aren't forced to erase more than requested.
    pub fn erase(&mut self, offset: u32, len: u32) -> Result<(), Error> {
        let from = self.base.checked_add(offset).ok_or(Error::OutOfBounds)?;
        let to = from.checked_add(len).ok_or(Error::OutOfBounds)?;
        self.backend.erase(from, to).map_err(|_| Error::Erase)
    }

    /// `nvs_getAddress`: the absolute backend address of `offset`, for
    /// callers that want to hand the region to something else (e.g. a DMA
    /// descriptor) instead of going through [`Self::read`].
    pub fn address_of(&self, offset: u32) -> u32 {
        self.base.wrapping_add(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockFlash;

    #[test]
    fn write_chunks_word_then_halfword_then_byte() {
        let flash = MockFlash::<64>::new();
        let mut nvs = Nvs::new(flash, 0);

        // 7 bytes: one word chunk, then one halfword, then one byte.
        let data = [1u8, 2, 3, 4, 5, 6, 7];
        assert!(nvs.write(0, &data).is_ok());

        let mut out = [0u8; 7];
        nvs.read(0, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn write_of_exactly_two_bytes_uses_single_halfword_chunk() {
        let flash = MockFlash::<64>::new();
        let mut nvs = Nvs::new(flash, 0);
        assert!(nvs.write(0, &[0xAA, 0xBB]).is_ok());
        let mut out = [0u8; 2];
        nvs.read(0, &mut out).unwrap();
        assert_eq!(out, [0xAA, 0xBB]);
    }

    #[test]
    fn write_of_single_byte_uses_byte_chunk() {
        let flash = MockFlash::<64>::new();
        let mut nvs = Nvs::new(flash, 0);
        assert!(nvs.write(0, &[0x42]).is_ok());
        let mut out = [0u8; 1];
        nvs.read(0, &mut out).unwrap();
        assert_eq!(out, [0x42]);
    }

    #[test]
    fn write_past_backend_capacity_is_rejected() {
        let flash = MockFlash::<4>::new();
        let mut nvs = Nvs::new(flash, 0);
        assert_eq!(nvs.write(0, &[1, 2, 3, 4, 5]), Err(Error::OutOfBounds));
    }

    #[test]
    fn erase_resets_region_to_blank() {
        let flash = MockFlash::<64>::new();
        let mut nvs = Nvs::new(flash, 0);
        nvs.write(0, &[1, 2, 3, 4]).unwrap();
        assert!(nvs.erase(0, 64).is_ok());
        let mut out = [0u8; 4];
        nvs.read(0, &mut out).unwrap();
        assert_eq!(out, [0xFF; 4]);
    }

    #[test]
    fn address_of_offsets_from_base() {
        let flash = MockFlash::<64>::new();
        let nvs = Nvs::new(flash, 0x1000);
        assert_eq!(nvs.address_of(0x20), 0x1020);
    }
}
