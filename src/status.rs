//! Status channel (C6): forwards relative time to the application and
//! carries the per-subchannel sequence-number flags that the CC, SSDO and
//! logbook channels use to detect acknowledgement.
//!
//! Grounded on `appif/appif-status.c`. The original splits inbound decode
//! across a pre-action (time, for the user sync callback) and a post-action
//! on the same buffer (icc/async-consumer status, then ack); both pulls are
//! against the same snapshot of the buffer for one cycle, so this crate
//! decodes everything in the pre-action and leaves the post-action to do
//! nothing but release the buffer.
//!
//! [`StatusChannel`] is registered against three separate actions (decode,
//! out-ack, in-encode) that all need to reach the same state; it holds that
//! state behind a `RefCell` so each action can keep a plain shared reference
//! instead of requiring three exclusive borrows to coexist.

use core::cell::RefCell;

use crate::codec;
use crate::seqnr::SeqNr;
use crate::stream::Action;
use crate::tbuf::AckRegister;

/// Relative time as carried in the status record, in wire units
/// (spec.md §4.9, [`crate::constime`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeStamp {
    pub low: u32,
    pub high: u32,
}

const REL_TIME_LOW_OFFSET: u32 = 0;
const REL_TIME_HIGH_OFFSET: u32 = 4;
const ICC_STATUS_OFFSET: u32 = 8;
const ASYNC_CONS_STATUS_OFFSET: u32 = 10;
/// Size of the inbound status record: two u32s, one status byte, one
/// reserved byte, one u16 (spec.md §4.10).
pub const OUT_BUFFER_SIZE: u32 = 12;

const ASYNC_PROD_STATUS_OFFSET: u32 = 0;
/// Size of the outbound status record, rounded up to the 4-byte triple
/// buffer alignment; only the first two bytes carry payload.
pub const IN_BUFFER_SIZE: u32 = 4;

const ICC_BUSY_FLAG_POS: u8 = 0;

fn bit_to_seqnr(set: bool) -> SeqNr {
    if set {
        SeqNr::Second
    } else {
        SeqNr::First
    }
}

#[derive(Default)]
struct Inner {
    time: TimeStamp,
    icc_status: u8,
    async_cons_status: u16,
    async_prod_status: u16,
}

/// Application-visible status state, shared by the pre/post actions
/// registered against the status buffers and by the CC/SSDO/logbook
/// channels that query per-channel flags.
#[derive(Default)]
pub struct StatusChannel {
    inner: RefCell<Inner>,
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative time decoded from the most recent cycle.
    pub fn relative_time(&self) -> TimeStamp {
        self.inner.borrow().time
    }

    /// The remote's busy/ack flag for the configuration channel.
    pub fn get_icc_status(&self) -> SeqNr {
        bit_to_seqnr(self.inner.borrow().icc_status & (1 << ICC_BUSY_FLAG_POS) != 0)
    }

    /// Flags async receive channel `ch` as busy (`Second`) or idle (`First`)
    /// in the status record this node produces.
    pub fn set_async_rx_chan_flag(&self, ch: u8, seq: SeqNr) {
        let mut inner = self.inner.borrow_mut();
        match seq {
            SeqNr::First => inner.async_prod_status &= !(1 << ch),
            _ => inner.async_prod_status |= 1 << ch,
        }
    }

    /// Reads the remote's transmit-channel flag for async channel `ch`.
    pub fn get_async_tx_chan_flag(&self, ch: u8) -> SeqNr {
        bit_to_seqnr(self.inner.borrow().async_cons_status & (1 << ch) != 0)
    }

    fn decode(&self, buf: &[u8]) -> bool {
        if buf.len() < OUT_BUFFER_SIZE as usize {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        inner.time.low = codec::get_u32_le(&buf[REL_TIME_LOW_OFFSET as usize..]);
        inner.time.high = codec::get_u32_le(&buf[REL_TIME_HIGH_OFFSET as usize..]);
        inner.icc_status = buf[ICC_STATUS_OFFSET as usize];
        inner.async_cons_status = codec::get_u16_le(&buf[ASYNC_CONS_STATUS_OFFSET as usize..]);
        true
    }

    fn encode(&self, buf: &mut [u8]) -> bool {
        if buf.len() < ASYNC_PROD_STATUS_OFFSET as usize + 2 {
            return false;
        }
        let prod = self.inner.borrow().async_prod_status;
        codec::set_u16_le(&mut buf[ASYNC_PROD_STATUS_OFFSET as usize..], prod);
        true
    }
}

/// Pre-action on the inbound (`StatusOut`) buffer: decodes time, icc status
/// and the consumer-status bitfield in one pass.
pub struct StatusDecodeAction<'a> {
    pub channel: &'a StatusChannel,
}

impl<'a> Action for StatusDecodeAction<'a> {
    fn run(&mut self, buf: &mut [u8], _ack: &mut AckRegister) -> bool {
        self.channel.decode(buf)
    }
}

/// Post-action on the inbound (`StatusOut`) buffer: releases it back to the
/// transport once this cycle's values have been consumed.
pub struct StatusOutAckAction {
    pub buffer_id: u8,
}

impl Action for StatusOutAckAction {
    fn run(&mut self, _buf: &mut [u8], ack: &mut AckRegister) -> bool {
        ack.clear(self.buffer_id);
        true
    }
}

/// Post-action on the outbound (`StatusIn`) buffer: encodes this node's
/// producer-status bitfield and releases the buffer.
pub struct StatusEncodeAction<'a> {
    pub channel: &'a StatusChannel,
    pub buffer_id: u8,
}

impl<'a> Action for StatusEncodeAction<'a> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        if !self.channel.encode(buf) {
            return false;
        }
        ack.clear(self.buffer_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_buf(low: u32, high: u32, icc: u8, cons: u16) -> [u8; OUT_BUFFER_SIZE as usize] {
        let mut buf = [0u8; OUT_BUFFER_SIZE as usize];
        codec::set_u32_le(&mut buf[REL_TIME_LOW_OFFSET as usize..], low);
        codec::set_u32_le(&mut buf[REL_TIME_HIGH_OFFSET as usize..], high);
        buf[ICC_STATUS_OFFSET as usize] = icc;
        codec::set_u16_le(&mut buf[ASYNC_CONS_STATUS_OFFSET as usize..], cons);
        buf
    }

    #[test]
    fn decode_extracts_time_and_flags() {
        let channel = StatusChannel::new();
        let mut buf = out_buf(0x1000, 0x2, 0x01, 0b0000_0010);
        let mut ack = AckRegister::new();
        let mut action = StatusDecodeAction { channel: &channel };
        assert!(action.run(&mut buf, &mut ack));

        assert_eq!(channel.relative_time(), TimeStamp { low: 0x1000, high: 0x2 });
        assert_eq!(channel.get_icc_status(), SeqNr::Second);
        assert_eq!(channel.get_async_tx_chan_flag(1), SeqNr::Second);
        assert_eq!(channel.get_async_tx_chan_flag(0), SeqNr::First);
    }

    #[test]
    fn undersized_buffer_fails_decode() {
        let channel = StatusChannel::new();
        let mut buf = [0u8; 4];
        let mut ack = AckRegister::new();
        let mut action = StatusDecodeAction { channel: &channel };
        assert!(!action.run(&mut buf, &mut ack));
    }

    #[test]
    fn rx_flag_round_trips_into_encode_action() {
        let channel = StatusChannel::new();
        channel.set_async_rx_chan_flag(2, SeqNr::Second);
        channel.set_async_rx_chan_flag(0, SeqNr::First);

        let mut buf = [0u8; IN_BUFFER_SIZE as usize];
        let mut ack = AckRegister::new();
        ack.clear(5);
        let mut action = StatusEncodeAction { channel: &channel, buffer_id: 5 };
        assert!(action.run(&mut buf, &mut ack));

        let prod = codec::get_u16_le(&buf[ASYNC_PROD_STATUS_OFFSET as usize..]);
        assert_eq!(prod, 0b0000_0100);
    }

    #[test]
    fn out_ack_action_clears_its_buffer_bit() {
        let mut ack = AckRegister::new();
        let mut buf = [0u8; OUT_BUFFER_SIZE as usize];
        let mut action = StatusOutAckAction { buffer_id: 3 };
        assert!(action.run(&mut buf, &mut ack));
        assert!(!ack.is_set(3));
    }
}
