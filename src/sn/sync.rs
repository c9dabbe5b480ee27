//! Sync-wait (C14): the final boot stage, run once handshake has completed.
//! The slave repeats a "ready" ping until the master has both received it
//! and observed the first cyclic sync interrupt from the PCP, at which
//! point the master samples its consecutive time and hands it back so the
//! slave can align its own clock before cyclic processing begins.
//!
//! Grounded on `boot/sync-ma.c` (no slave-side source was present in this
//! set, so [`wait_slave`] is inferred from the master's expectations: a
//! `tReadyMsg` ping matching `READY_MSG_CONTENT` and a `tSyncMsg` pong
//! carrying the header echoed back plus a 64-bit consecutive time). The
//! master's `readyReceived` runs entirely inside the verify callback of its
//! `pipo_doTransfer` call — verify header, wait for the sync IRQ, sample
//! time, fill the reply — which is why [`wait_master`] folds the same three
//! steps into [`pingpong::respond`]'s `on_ping` closure rather than
//! sequencing them as separate calls.

use crate::codec;
use crate::config::{self, READY_MSG_CONTENT};
use crate::constime::ConsecutiveTime;
use crate::error::{ErrSource, ErrorCode, ErrorHandler};
use crate::platform::{DelayMs, HardwareCounter, InterruptCtrl, SerialLink};
use crate::sn::pingpong;

const HEADER_OFFSET: usize = 0;
const CONS_TIME_OFFSET: usize = 4;
const READY_MSG_LEN: usize = 4;
const SYNC_MSG_LEN: usize = 12;

fn wait_for_sync_irq(irq: &mut impl InterruptCtrl) {
    irq.enable_sync_irq();
    while !irq.sync_irq_pending() {}
    irq.clear_sync_irq();
    irq.disable_sync_irq();
}

/// Master side: receives the slave's ready ping, waits for the first sync
/// interrupt, samples the consecutive time base and replies with it.
pub fn wait_master<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    irq: &mut impl InterruptCtrl,
    cons_time: &ConsecutiveTime,
    counter: &impl HardwareCounter,
    errh: &ErrorHandler,
) -> bool {
    let mut ready = [0u8; READY_MSG_LEN];
    let mut response = [0u8; SYNC_MSG_LEN];

    pingpong::respond(
        serial,
        delay,
        &mut ready,
        &mut response,
        // unbounded: the master has nothing else to do before cyclic
        // processing starts, so it simply busy-waits for the slave's ready
        // ping the way `sync-ma.c` does.
        0,
        config::SYNC_READY_ARM_DELAY_MS,
        |rdy, resp| {
            if rdy.len() != READY_MSG_LEN || codec::get_u32_le(&rdy[HEADER_OFFSET..]) != READY_MSG_CONTENT {
                errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::ReadyMsgInvalid, 0);
                return false;
            }

            wait_for_sync_irq(irq);
            let sampled = cons_time.time_base(counter);

            codec::set_u32_le(&mut resp[HEADER_OFFSET..], READY_MSG_CONTENT);
            codec::set_u64_le(&mut resp[CONS_TIME_OFFSET..], sampled);
            true
        },
        errh,
    )
}

/// Slave side: sends a ready ping (retrying on timeout), then adopts the
/// master's sampled consecutive time as its own clock's base once the
/// reply's header is verified.
pub fn wait_slave<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    cons_time: &ConsecutiveTime,
    errh: &ErrorHandler,
) -> bool {
    let mut ready = [0u8; READY_MSG_LEN];
    codec::set_u32_le(&mut ready[HEADER_OFFSET..], READY_MSG_CONTENT);
    let mut response = [0u8; SYNC_MSG_LEN];
    let mut sampled = None;

    let ok = pingpong::transfer(
        serial,
        delay,
        &ready,
        &mut response,
        config::SYNC_RESPONSE_TIMEOUT_MS,
        config::PINGPONG_SLAVE_ARM_DELAY_MS,
        |buf| {
            if buf.len() != SYNC_MSG_LEN || codec::get_u32_le(&buf[HEADER_OFFSET..]) != READY_MSG_CONTENT {
                errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::ResponseMsgInvalid, 0);
                return false;
            }
            sampled = Some(codec::get_u64_le(&buf[CONS_TIME_OFFSET..]));
            true
        },
        errh,
    );

    match (ok, sampled) {
        (true, Some(value)) => {
            cons_time.set_time_base(value);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockCounter, MockDelay, MockSerial};
    use core::cell::Cell;

    struct MockIrq {
        pending_after: u32,
        polls: Cell<u32>,
        enabled: Cell<bool>,
        cleared: Cell<bool>,
    }

    impl InterruptCtrl for MockIrq {
        fn enable_sync_irq(&mut self) {
            self.enabled.set(true);
        }
        fn disable_sync_irq(&mut self) {
            self.enabled.set(false);
        }
        fn sync_irq_pending(&self) -> bool {
            let n = self.polls.get() + 1;
            self.polls.set(n);
            n >= self.pending_after
        }
        fn clear_sync_irq(&mut self) {
            self.cleared.set(true);
        }
    }

    #[test]
    fn master_waits_for_irq_then_replies_with_sampled_time() {
        let mut serial = MockSerial::default();
        let mut ready = [0u8; READY_MSG_LEN];
        codec::set_u32_le(&mut ready[HEADER_OFFSET..], READY_MSG_CONTENT);
        serial.push_inbound(&ready);
        let mut delay = MockDelay::default();
        let mut irq = MockIrq { pending_after: 3, polls: Cell::new(0), enabled: Cell::new(false), cleared: Cell::new(false) };
        let cons_time = ConsecutiveTime::new();
        cons_time.set_time_base(0x0000_1234_5678_ABCD);
        let counter = MockCounter::default();
        let errh = ErrorHandler::new();

        let ok = wait_master(&mut serial, &mut delay, &mut irq, &cons_time, &counter, &errh);

        assert!(ok);
        assert!(irq.cleared.get());
        assert!(!irq.enabled.get());
        assert_eq!(&serial.outbox[..4], &READY_MSG_CONTENT.to_le_bytes());
        let replied = codec::get_u64_le(&serial.outbox[CONS_TIME_OFFSET..]);
        assert_eq!(replied, 0x0000_1234_5678_ABCD);
    }

    #[test]
    fn master_rejects_malformed_ready_header() {
        let mut serial = MockSerial::default();
        serial.push_inbound(&[0u8; READY_MSG_LEN]);
        let mut delay = MockDelay::default();
        let mut irq = MockIrq { pending_after: 1, polls: Cell::new(0), enabled: Cell::new(false), cleared: Cell::new(false) };
        let cons_time = ConsecutiveTime::new();
        let counter = MockCounter::default();
        let errh = ErrorHandler::new();

        let ok = wait_master(&mut serial, &mut delay, &mut irq, &cons_time, &counter, &errh);

        assert!(!ok);
        assert!(!irq.enabled.get());
        assert!(serial.outbox.is_empty());
    }

    #[test]
    fn slave_adopts_masters_sampled_time() {
        let mut serial = MockSerial::default();
        let mut reply = [0u8; SYNC_MSG_LEN];
        codec::set_u32_le(&mut reply[HEADER_OFFSET..], READY_MSG_CONTENT);
        codec::set_u64_le(&mut reply[CONS_TIME_OFFSET..], 0x0000_1234_5678_ABCD);
        serial.push_inbound(&reply);
        let mut delay = MockDelay::default();
        let cons_time = ConsecutiveTime::new();
        let errh = ErrorHandler::new();

        let ok = wait_slave(&mut serial, &mut delay, &cons_time, &errh);

        assert!(ok);
        let counter = MockCounter::default();
        assert!(cons_time.time_base(&counter) >= 0x0000_1234_5678_ABCD);
    }

    #[test]
    fn slave_rejects_mismatched_reply_header() {
        let mut serial = MockSerial::default();
        let mut reply = [0u8; SYNC_MSG_LEN];
        reply[HEADER_OFFSET] = 0;
        serial.push_inbound(&reply);
        let mut delay = MockDelay::default();
        let cons_time = ConsecutiveTime::new();
        let errh = ErrorHandler::new();

        let ok = wait_slave(&mut serial, &mut delay, &cons_time, &errh);

        assert!(!ok);
        assert!(errh.shutdown_requested());
    }
}
