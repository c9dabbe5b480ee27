//! Logbook channel (C10): a unidirectional diagnostic post channel, the
//! outbound half of the SSDO handshake with no receive side.
//!
//! Grounded on `libs/appif/logbook.c`: `log_postLogEntry` arms transmission
//! without advancing the sequence number (a busy retry reposts the same
//! frame); a post-action (`log_incrTimeout`) re-encodes the current frame
//! and advances the timeout counter every cycle regardless of lock state;
//! `log_process`/`log_handleTxFrame` (the async loop) is where a confirmed
//! ack or an expired timeout actually frees the channel and advances the
//! sequence for the next post. [`Logbook`] reproduces that split with the
//! same `RefCell`-shared-state pattern used by [`crate::ssdo::Ssdo`], except
//! that here the post-action — not `post_log_entry` itself — is what writes
//! to shared memory and releases the buffer, since this crate's post
//! context has no access to the transport outside the stream engine's
//! action dispatch.

use core::cell::RefCell;

use crate::codec;
use crate::config::LOG_TX_TIMEOUT_CYCLE_COUNT;
use crate::error::{ErrSource, ErrorDesc, ErrorCode, Severity};
use crate::seqnr::SeqNr;
use crate::status::StatusChannel;
use crate::stream::Action;
use crate::tbuf::AckRegister;

const SEQ_OFFSET: usize = 0;
const SOURCE_OFFSET: usize = 2;
const LEVEL_OFFSET: usize = 3;
const CODE_OFFSET: usize = 4;
const ADDITIONAL_INFO_OFFSET: usize = 6;
const CONTEXT_OFFSET: usize = 10;

/// One diagnostic entry. `CTX` is the compile-time size of the optional
/// context payload (spec.md §6 "optional context bytes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogRecord<const CTX: usize> {
    pub source: u8,
    pub level: u8,
    pub code: u16,
    pub additional_info: u32,
    pub context: [u8; CTX],
}

impl<const CTX: usize> LogRecord<CTX> {
    pub const fn new(source: u8, level: u8, code: u16, additional_info: u32) -> Self {
        Self { source, level, code, additional_info, context: [0; CTX] }
    }

    /// Builds a record from a reported [`ErrorDesc`], the bridge the error
    /// handler's `logbook_post` closure is expected to use.
    pub fn from_error(desc: ErrorDesc) -> Self {
        Self {
            source: desc.source as u8,
            level: desc.severity as u8,
            code: desc.code as u16,
            additional_info: desc.additional_info,
            context: [0; CTX],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogTxStatus {
    Successful,
    Busy,
    Error,
}

struct Inner<const CTX: usize> {
    record: LogRecord<CTX>,
    locked: bool,
    tx_seq: SeqNr,
    tx_timeout: u32,
}

/// Shared channel state; `channel` indexes this instance's flag in the
/// status record's async-producer bitfield.
pub struct Logbook<const CTX: usize> {
    channel: u8,
    inner: RefCell<Inner<CTX>>,
}

impl<const CTX: usize> Logbook<CTX> {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            inner: RefCell::new(Inner {
                record: LogRecord::new(0, 0, 0, 0),
                locked: false,
                tx_seq: SeqNr::Second,
                tx_timeout: 0,
            }),
        }
    }

    /// Stamps the buffer with the *current* (not yet advanced) sequence
    /// number and arms transmission. `log_postLogEntry` only flips the
    /// sequence once the in-flight frame is accounted for — see
    /// [`Self::process`] — so a busy retry reposts the same number.
    pub fn post_log_entry(&self, record: LogRecord<CTX>) -> LogTxStatus {
        let mut inner = self.inner.borrow_mut();
        if inner.locked {
            return LogTxStatus::Busy;
        }
        inner.record = record;
        inner.locked = true;
        inner.tx_timeout = 0;
        LogTxStatus::Successful
    }

    /// Reconciles ack/timeout. Both a confirmed ack and a timeout expiry
    /// free the channel and advance the sequence number, readying it for
    /// the next post (`log_handleTxFrame`).
    pub fn process(&self, status: &StatusChannel) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.locked {
            if status.get_async_tx_chan_flag(self.channel) == inner.tx_seq {
                inner.locked = false;
                inner.tx_seq = next_log_seq(inner.tx_seq);
                inner.tx_timeout = 0;
            } else if inner.tx_timeout >= LOG_TX_TIMEOUT_CYCLE_COUNT {
                inner.locked = false;
                inner.tx_seq = next_log_seq(inner.tx_seq);
            }
        }
        true
    }

    /// Re-encodes the frame in flight (or an `Invalid` header when idle) and
    /// unconditionally advances the timeout counter, matching
    /// `log_incrTimeout`'s lock-independent increment.
    fn encode_tx(&self, buf: &mut [u8]) -> bool {
        if buf.len() < CONTEXT_OFFSET + CTX {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        if inner.locked {
            let rec = inner.record;
            buf[SEQ_OFFSET] = inner.tx_seq.to_wire();
            buf[SOURCE_OFFSET] = rec.source;
            buf[LEVEL_OFFSET] = rec.level;
            codec::set_u16_le(&mut buf[CODE_OFFSET..], rec.code);
            codec::set_u32_le(&mut buf[ADDITIONAL_INFO_OFFSET..], rec.additional_info);
            buf[CONTEXT_OFFSET..CONTEXT_OFFSET + CTX].copy_from_slice(&rec.context);
        } else {
            buf[SEQ_OFFSET] = SeqNr::Invalid.to_wire();
        }
        inner.tx_timeout += 1;
        true
    }
}

/// `log_changeLocalSeqNr` alternates First<->Second but, unlike
/// [`SeqNr::next`], never passes through `Invalid` (the channel starts at
/// `Second` so the first post lands on `First`).
fn next_log_seq(seq: SeqNr) -> SeqNr {
    match seq {
        SeqNr::First => SeqNr::Second,
        _ => SeqNr::First,
    }
}

/// Post-action on the channel's tx buffer.
pub struct LogEncodeAction<'a, const CTX: usize> {
    pub channel: &'a Logbook<CTX>,
    pub buffer_id: u8,
}

impl<'a, const CTX: usize> Action for LogEncodeAction<'a, CTX> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        if !self.channel.encode_tx(buf) {
            return false;
        }
        ack.clear(self.buffer_id);
        true
    }
}

/// Wires a [`Logbook`] channel as the `logbook_post` closure target for
/// [`crate::error::ErrorHandler::post`].
pub fn post_error<const CTX: usize>(log: &Logbook<CTX>, desc: ErrorDesc) -> bool {
    matches!(log.post_log_entry(LogRecord::from_error(desc)), LogTxStatus::Successful)
}

impl<const CTX: usize> crate::error::LogbookSink for Logbook<CTX> {
    fn post_error(&self, desc: ErrorDesc) -> bool {
        post_error(self, desc)
    }
}
