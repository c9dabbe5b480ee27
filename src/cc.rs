//! Configuration channel (C8): a streamed key-value protocol carrying one
//! object in each direction per cycle, over `CcInput` (PCP to AP) and
//! `CcOutput` (AP to PCP).
//!
//! Grounded on `appifcommon/appif-ccobject.c` for the object-list shape
//! and write/read semantics, and spec.md §4.5 for the per-cycle arm/ack/
//! timeout protocol (the single in-flight write slot, confirmed through
//! [`crate::status::StatusChannel::get_icc_status`] rather than the
//! original's content-matched write cursor, which this crate does not
//! reproduce — see DESIGN.md).

use core::cell::RefCell;

use crate::codec;
use crate::config::CC_TX_TIMEOUT_CYCLE_COUNT;
use crate::error::{ErrSource, ErrorCode, ErrorHandler};
use crate::config::ModuleMask;
use crate::seqnr::SeqNr;
use crate::status::StatusChannel;
use crate::stream::Action;
use crate::tbuf::AckRegister;

const SEQ_OFFSET: u32 = 0;
const SUBIDX_OFFSET: u32 = 1;
const IDX_OFFSET: u32 = 2;
const PAYLOAD_LO_OFFSET: u32 = 4;
const PAYLOAD_HI_OFFSET: u32 = 8;
/// `[seq:u8 | subidx:u8 | idx:u16 LE | payload_lo:u32 LE | payload_hi:u32 LE]` (spec.md §6).
pub const RECORD_SIZE: u32 = 12;

/// One entry of the compile-time object list. `size` is the byte width of
/// the payload actually in use (1, 2, 4 or 8); `payload_hi` only applies to
/// an 8-byte object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CcObject {
    pub index: u16,
    pub subindex: u8,
    pub size: u8,
    pub payload_lo: u32,
    pub payload_hi: u32,
}

impl CcObject {
    pub const fn new(index: u16, subindex: u8, size: u8) -> Self {
        Self { index, subindex, size, payload_lo: 0, payload_hi: 0 }
    }

    fn matches(&self, index: u16, subindex: u8) -> bool {
        self.index == index && self.subindex == subindex
    }

    fn decode_payload(&mut self, buf: &[u8]) {
        match self.size {
            1 => self.payload_lo = codec::get_u8_le(buf) as u32,
            2 => self.payload_lo = codec::get_u16_le(buf) as u32,
            4 => self.payload_lo = codec::get_u32_le(buf),
            8 => {
                self.payload_lo = codec::get_u32_le(buf);
                self.payload_hi = codec::get_u32_le(&buf[4..]);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcWriteState {
    Successful,
    Busy,
    NotFound,
}

/// Hook invoked once an inbound object write has been decoded and cached,
/// e.g. to apply the value to a local object dictionary.
pub trait CcUpdateHook {
    fn on_object_updated(&mut self, index: u16, subindex: u8, payload_lo: u32, payload_hi: u32);
}

struct Inner<'a, const N: usize> {
    objects: [CcObject; N],
    armed: Option<usize>,
    tx_seq: SeqNr,
    tx_timeout: u32,
    rx_last_seq: SeqNr,
    hook: &'a mut dyn CcUpdateHook,
}

/// Shared channel state; registered against a decode pre-action and an
/// encode/timeout post-action, both holding a plain `&CcChannel`.
pub struct CcChannel<'a, const N: usize> {
    inner: RefCell<Inner<'a, N>>,
}

impl<'a, const N: usize> CcChannel<'a, N> {
    pub fn new(objects: [CcObject; N], hook: &'a mut dyn CcUpdateHook) -> Self {
        Self {
            inner: RefCell::new(Inner {
                objects,
                armed: None,
                tx_seq: SeqNr::Invalid,
                tx_timeout: 0,
                rx_last_seq: SeqNr::Invalid,
                hook,
            }),
        }
    }

    /// Stages `payload` for object `{index, subindex}`; `Busy` if any object
    /// (including this one) is still awaiting acknowledgement. The channel
    /// has a single in-flight slot, exactly like `Ssdo::post_payload`.
    pub fn write_object(&self, index: u16, subindex: u8, size: u8, payload: &[u8]) -> CcWriteState {
        let mut inner = self.inner.borrow_mut();
        let pos = match inner.objects.iter().position(|o| o.matches(index, subindex) && o.size == size) {
            Some(p) => p,
            None => return CcWriteState::NotFound,
        };
        if inner.armed.is_some() {
            return CcWriteState::Busy;
        }
        inner.tx_seq = inner.tx_seq.next();
        inner.tx_timeout = 0;
        inner.objects[pos].decode_payload(payload);
        inner.armed = Some(pos);
        CcWriteState::Successful
    }

    pub fn read_object(&self, index: u16, subindex: u8) -> Option<CcObject> {
        self.inner.borrow().objects.iter().find(|o| o.matches(index, subindex)).copied()
    }

    fn decode_inbound(&self, buf: &[u8], errors: &ErrorHandler) -> bool {
        if buf.len() < RECORD_SIZE as usize {
            return false;
        }
        let seq = match SeqNr::from_wire(buf[SEQ_OFFSET as usize]) {
            Some(s) => s,
            None => return true,
        };
        let mut inner = self.inner.borrow_mut();
        if seq == SeqNr::Invalid || seq == inner.rx_last_seq {
            return true;
        }
        let subidx = buf[SUBIDX_OFFSET as usize];
        let idx = codec::get_u16_le(&buf[IDX_OFFSET as usize..]);
        let pos = match inner.objects.iter().position(|o| o.matches(idx, subidx)) {
            Some(p) => p,
            None => {
                errors.post_minor(ErrSource::Sapl, ModuleMask(ModuleMask::CC), ErrorCode::InvalidParameter, idx as u32);
                return true;
            }
        };
        let payload = &buf[PAYLOAD_LO_OFFSET as usize..(PAYLOAD_LO_OFFSET + 8) as usize];
        inner.objects[pos].decode_payload(payload);
        let (lo, hi) = (inner.objects[pos].payload_lo, inner.objects[pos].payload_hi);
        inner.rx_last_seq = seq;
        inner.hook.on_object_updated(idx, subidx, lo, hi);
        true
    }

    fn encode_outbound(&self, buf: &mut [u8], status: &StatusChannel, errors: &ErrorHandler) -> bool {
        if buf.len() < RECORD_SIZE as usize {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        if inner.armed.is_some() {
            if status.get_icc_status() == inner.tx_seq {
                inner.armed = None;
                inner.tx_timeout = 0;
            } else {
                inner.tx_timeout += 1;
                if inner.tx_timeout >= CC_TX_TIMEOUT_CYCLE_COUNT {
                    inner.armed = None;
                    inner.tx_seq = inner.tx_seq.next();
                    errors.post_minor(ErrSource::Sapl, ModuleMask(ModuleMask::CC), ErrorCode::Timeout, 0);
                }
            }
        }

        match inner.armed {
            Some(pos) => {
                let obj = inner.objects[pos];
                buf[SEQ_OFFSET as usize] = inner.tx_seq.to_wire();
                buf[SUBIDX_OFFSET as usize] = obj.subindex;
                codec::set_u16_le(&mut buf[IDX_OFFSET as usize..], obj.index);
                codec::set_u32_le(&mut buf[PAYLOAD_LO_OFFSET as usize..], obj.payload_lo);
                codec::set_u32_le(&mut buf[PAYLOAD_HI_OFFSET as usize..], obj.payload_hi);
            }
            None => {
                buf[SEQ_OFFSET as usize] = SeqNr::Invalid.to_wire();
            }
        }
        true
    }
}

/// Pre-action on `CcInput`.
pub struct CcDecodeAction<'a, 'b, 'e, const N: usize> {
    pub channel: &'a CcChannel<'b, N>,
    pub errors: &'a ErrorHandler<'e>,
    pub buffer_id: u8,
}

impl<'a, 'b, 'e, const N: usize> Action for CcDecodeAction<'a, 'b, 'e, N> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        let ok = self.channel.decode_inbound(buf, self.errors);
        ack.clear(self.buffer_id);
        ok
    }
}

/// Post-action on `CcOutput`.
pub struct CcEncodeAction<'a, 'b, 'e, const N: usize> {
    pub channel: &'a CcChannel<'b, N>,
    pub status: &'a StatusChannel,
    pub errors: &'a ErrorHandler<'e>,
    pub buffer_id: u8,
}

impl<'a, 'b, 'e, const N: usize> Action for CcEncodeAction<'a, 'b, 'e, N> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        if !self.channel.encode_outbound(buf, self.status, self.errors) {
            return false;
        }
        ack.clear(self.buffer_id);
        true
    }
}
