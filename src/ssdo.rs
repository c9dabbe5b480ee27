//! SSDO async channel (C9): a bidirectional reliable datagram channel built
//! on top of a sequence-number handshake, one frame in flight per direction.
//!
//! Grounded on `unittest/psi/TSTssdo/Driver/TSTssdoReadWritePayload.c` for
//! the API surface (`ssdo_postPayload`/`ssdo_process`/the busy-then-timeout
//! life cycle) and `libs/appif/logbook.c` for the split between the sync
//! post-action (which only advances the timeout counter and re-encodes the
//! current frame every cycle) and the async `process()` call (which is
//! where a completed or expired transmission actually unlocks the channel).

use core::cell::RefCell;
use core::ops::{Deref, DerefMut};

use crate::codec;
use crate::config::SSDO_TX_TIMEOUT_CYCLE_COUNT;
use crate::seqnr::SeqNr;
use crate::status::StatusChannel;
use crate::stream::Action;
use crate::tbuf::AckRegister;

const SEQ_OFFSET: usize = 0;
/// One reserved byte between the sequence number and the payload (spec.md §6).
const PAYLOAD_OFFSET: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SsdoTxStatus {
    Successful,
    Busy,
    Error,
}

/// Invoked once per fresh inbound frame; returning `false` aborts the cycle
/// (spec.md §4.1 "Failure semantics"), matching `TST_receivePayloadInvalidHandler`.
pub trait SsdoRxHandler {
    fn on_payload(&mut self, payload: &[u8]) -> bool;
}

struct Inner<'a, const MAX: usize> {
    stage: [u8; MAX],
    stage_len: usize,
    tx_locked: bool,
    tx_seq: SeqNr,
    tx_timeout: u32,
    rx_last_seq: SeqNr,
    handler: &'a mut dyn SsdoRxHandler,
}

/// Shared channel state. `channel` is the sub-channel index used to look up
/// this instance's flag in the status record's async bitfields; `MAX` is the
/// compile-time payload capacity.
pub struct Ssdo<'a, const MAX: usize> {
    channel: u8,
    inner: RefCell<Inner<'a, MAX>>,
}

/// Handle to the free staging buffer returned by [`Ssdo::get_current_tx_buffer`].
/// Derefs to the payload bytes; writing through it and then calling
/// [`Ssdo::post_payload`] with the same bytes arms transmission.
///
/// Two lifetimes, not one: `'s` is the `RefCell` borrow's duration, `'a` is
/// the channel's own (the handler reference `Inner` embeds is `&'a mut dyn
/// SsdoRxHandler`, which is invariant, so it cannot be unified with the
/// shorter per-call borrow).
pub struct TxStagingGuard<'s, 'a, const MAX: usize> {
    inner: core::cell::RefMut<'s, Inner<'a, MAX>>,
}

impl<'s, 'a, const MAX: usize> Deref for TxStagingGuard<'s, 'a, MAX> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.inner.stage[..]
    }
}

impl<'s, 'a, const MAX: usize> DerefMut for TxStagingGuard<'s, 'a, MAX> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.inner.stage[..]
    }
}

impl<'a, const MAX: usize> Ssdo<'a, MAX> {
    pub fn new(channel: u8, handler: &'a mut dyn SsdoRxHandler) -> Self {
        Self {
            channel,
            inner: RefCell::new(Inner {
                stage: [0; MAX],
                stage_len: 0,
                tx_locked: false,
                tx_seq: SeqNr::Invalid,
                tx_timeout: 0,
                rx_last_seq: SeqNr::Invalid,
                handler,
            }),
        }
    }

    /// Returns the staging buffer, but only while the channel is free. Does
    /// not itself arm transmission: follow up with [`Self::post_payload`].
    pub fn get_current_tx_buffer(&self) -> Option<TxStagingGuard<'_, 'a, MAX>> {
        let inner = self.inner.borrow_mut();
        if inner.tx_locked {
            None
        } else {
            Some(TxStagingGuard { inner })
        }
    }

    /// Locks the channel, stamps the current local tx sequence number and
    /// arms transmission. Rejects zero-length or oversized payloads without
    /// mutating state.
    pub fn post_payload(&self, payload: &[u8]) -> SsdoTxStatus {
        if payload.is_empty() || payload.len() > MAX {
            return SsdoTxStatus::Error;
        }
        let mut inner = self.inner.borrow_mut();
        if inner.tx_locked {
            return SsdoTxStatus::Busy;
        }
        inner.stage[..payload.len()].copy_from_slice(payload);
        inner.stage_len = payload.len();
        inner.tx_seq = inner.tx_seq.next();
        inner.tx_locked = true;
        inner.tx_timeout = 0;
        SsdoTxStatus::Successful
    }

    /// Drains the channel: unlocks once the remote's flag matches the
    /// frame in flight, or force-unlocks and advances on timeout expiry.
    pub fn process(&self, status: &StatusChannel) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.tx_locked {
            if status.get_async_tx_chan_flag(self.channel) == inner.tx_seq {
                inner.tx_locked = false;
                inner.tx_timeout = 0;
            } else if inner.tx_timeout >= SSDO_TX_TIMEOUT_CYCLE_COUNT {
                inner.tx_locked = false;
                inner.tx_seq = inner.tx_seq.next();
            }
        }
        true
    }

    fn decode_rx(&self, buf: &[u8], status: &StatusChannel) -> bool {
        if buf.len() <= PAYLOAD_OFFSET {
            return false;
        }
        let seq = match SeqNr::from_wire(buf[SEQ_OFFSET]) {
            Some(s) => s,
            None => return true,
        };
        let mut inner = self.inner.borrow_mut();
        if seq == SeqNr::Invalid || seq == inner.rx_last_seq {
            return true;
        }
        inner.rx_last_seq = seq;
        let ok = inner.handler.on_payload(&buf[PAYLOAD_OFFSET..]);
        status.set_async_rx_chan_flag(self.channel, seq);
        ok
    }

    /// Re-encodes the frame in flight (or an `Invalid` header when idle) and
    /// advances the timeout counter. Does not itself decide to unlock — see
    /// [`Self::process`].
    fn encode_tx(&self, buf: &mut [u8]) -> bool {
        if buf.len() <= PAYLOAD_OFFSET {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        if inner.tx_locked {
            buf[SEQ_OFFSET] = inner.tx_seq.to_wire();
            let len = inner.stage_len;
            let stage = inner.stage;
            buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len].copy_from_slice(&stage[..len]);
            inner.tx_timeout += 1;
        } else {
            buf[SEQ_OFFSET] = SeqNr::Invalid.to_wire();
        }
        true
    }
}

/// Pre-action on the channel's rx buffer.
pub struct SsdoDecodeAction<'a, 'b, const MAX: usize> {
    pub channel: &'a Ssdo<'b, MAX>,
    pub status: &'a StatusChannel,
    pub buffer_id: u8,
}

impl<'a, 'b, const MAX: usize> Action for SsdoDecodeAction<'a, 'b, MAX> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        let ok = self.channel.decode_rx(buf, self.status);
        ack.clear(self.buffer_id);
        ok
    }
}

/// Post-action on the channel's tx buffer.
pub struct SsdoEncodeAction<'a, 'b, const MAX: usize> {
    pub channel: &'a Ssdo<'b, MAX>,
    pub buffer_id: u8,
}

impl<'a, 'b, const MAX: usize> Action for SsdoEncodeAction<'a, 'b, MAX> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        if !self.channel.encode_tx(buf) {
            return false;
        }
        ack.clear(self.buffer_id);
        true
    }
}
