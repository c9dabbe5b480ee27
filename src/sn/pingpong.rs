//! Ping/pong transfer (C12): the framing primitive both the handshake and
//! the sync-wait exchange are built on.
//!
//! Grounded on `boot/pingpong-sl.c`. `pipo_doTransfer` sleeps to let the
//! other processor arm its receiver, then loops sending a ping and waiting
//! for the pong, retrying for as long as the receive times out rather than
//! fails outright. This crate keeps that retry-on-timeout, abort-on-error
//! split in [`ReceiveOutcome`] and [`transfer`].

use crate::error::{ErrSource, ErrorCode, ErrorHandler};
use crate::platform::{DelayMs, SerialLink};

/// Outcome of waiting for the pong half of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiveOutcome {
    Successful,
    Error,
    Retry,
}

/// Carries out one ping/pong exchange: send `ping` over `serial`, then
/// receive into `pong` and hand it to `verify` for content validation.
/// A receive timeout retries the whole exchange (re-sending the ping);
/// a transmit failure or a failed `verify` aborts immediately.
///
/// `arm_delay_ms` mirrors the fixed settle time both `pingpong-sl.c`
/// (100 ms before the first ping) and `handshake-ma.c` (100 ms before
/// the response) sleep before acting, giving the other side time to arm
/// its receiver.
pub fn transfer<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    ping: &[u8],
    pong: &mut [u8],
    pong_timeout_ms: u32,
    arm_delay_ms: u32,
    mut verify: impl FnMut(&[u8]) -> bool,
    errh: &ErrorHandler,
) -> bool {
    delay.delay_ms(arm_delay_ms);

    loop {
        if serial.write_all(ping).is_err() {
            errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::SerialTransmitFailed, 0);
            return false;
        }

        match receive_pong(serial, pong, pong_timeout_ms, &mut verify) {
            ReceiveOutcome::Successful => return true,
            ReceiveOutcome::Error => return false,
            ReceiveOutcome::Retry => continue,
        }
    }
}

/// Master-side counterpart of [`transfer`]: waits for the other side's ping
/// (up to `ping_timeout_ms`, `0` for an unbounded busy-wait), hands it to
/// `on_ping` to verify and fill the reply, then sleeps `arm_delay_ms` before
/// sending it back.
///
/// Grounded on `boot/handshake-ma.c`/`boot/sync-ma.c`: both call the same
/// `pipo_doTransfer` primitive the slave does, but the master-side
/// implementation behind it receives first and only arms its transmitter
/// after a fixed settle delay once the incoming message verifies — the
/// mirror image of [`transfer`]'s send-then-receive order.
pub fn respond<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    ping: &mut [u8],
    pong: &mut [u8],
    ping_timeout_ms: u32,
    arm_delay_ms: u32,
    mut on_ping: impl FnMut(&[u8], &mut [u8]) -> bool,
    errh: &ErrorHandler,
) -> bool {
    if serial.read_exact_timeout(ping, ping_timeout_ms).is_err() {
        errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::SerialReceiveFailed, 0);
        return false;
    }

    if !on_ping(ping, pong) {
        return false;
    }

    delay.delay_ms(arm_delay_ms);

    if serial.write_all(pong).is_err() {
        errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::SerialTransmitFailed, 0);
        return false;
    }

    true
}

fn receive_pong<S: SerialLink>(
    serial: &mut S,
    pong: &mut [u8],
    timeout_ms: u32,
    verify: &mut impl FnMut(&[u8]) -> bool,
) -> ReceiveOutcome {
    match serial.read_exact_timeout(pong, timeout_ms) {
        Ok(()) => {
            if verify(pong) {
                ReceiveOutcome::Successful
            } else {
                ReceiveOutcome::Error
            }
        }
        Err(crate::platform::SerialError::Timeout) => ReceiveOutcome::Retry,
        Err(_) => ReceiveOutcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockDelay, MockSerial};

    #[test]
    fn successful_exchange_returns_true_on_first_try() {
        let mut serial = MockSerial::default();
        serial.push_inbound(&[0xAA, 0xBB]);
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut pong = [0u8; 2];
        let ok = transfer(&mut serial, &mut delay, &[1, 2, 3], &mut pong, 1000, 100, |buf| buf == [0xAA, 0xBB], &errh);

        assert!(ok);
        assert_eq!(serial.outbox.as_slice(), &[1, 2, 3]);
        assert_eq!(delay.total_ms, 100);
    }

    /// A serial link whose first `read_exact_timeout` calls time out, then
    /// succeeds, used to exercise the retry-on-timeout path deterministically.
    struct FlakySerial {
        reads_until_success: u32,
        reply: [u8; 2],
        pub writes: u32,
    }

    impl SerialLink for FlakySerial {
        type Error = ();

        fn write_all(&mut self, _buf: &[u8]) -> Result<(), Self::Error> {
            self.writes += 1;
            Ok(())
        }

        fn read_exact_timeout(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<(), crate::platform::SerialError> {
            if self.reads_until_success > 0 {
                self.reads_until_success -= 1;
                return Err(crate::platform::SerialError::Timeout);
            }
            buf.copy_from_slice(&self.reply);
            Ok(())
        }
    }

    #[test]
    fn timeout_retries_and_resends_ping() {
        let mut serial = FlakySerial { reads_until_success: 2, reply: [0x11, 0x22], writes: 0 };
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut pong = [0u8; 2];
        let ok = transfer(&mut serial, &mut delay, &[9], &mut pong, 500, 0, |buf| buf == [0x11, 0x22], &errh);

        assert!(ok);
        assert_eq!(serial.writes, 3);
        assert_eq!(pong, [0x11, 0x22]);
    }

    #[test]
    fn transmit_failure_aborts_without_retry() {
        let mut serial = MockSerial::default();
        serial.fail_write = true;
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut pong = [0u8; 2];
        let ok = transfer(&mut serial, &mut delay, &[1], &mut pong, 500, 0, |_| true, &errh);

        assert!(!ok);
        assert!(errh.shutdown_requested());
    }

    #[test]
    fn failed_verification_aborts_without_retry() {
        let mut serial = MockSerial::default();
        serial.push_inbound(&[0xFF, 0xFF]);
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut pong = [0u8; 2];
        let ok = transfer(&mut serial, &mut delay, &[1], &mut pong, 500, 0, |_| false, &errh);

        assert!(!ok);
    }

    #[test]
    fn respond_receives_verifies_and_replies_after_delay() {
        let mut serial = MockSerial::default();
        serial.push_inbound(&[0xAA, 0xBB]);
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut ping = [0u8; 2];
        let mut pong = [0u8; 2];
        let ok = respond(
            &mut serial,
            &mut delay,
            &mut ping,
            &mut pong,
            0,
            100,
            |p, reply| {
                assert_eq!(p, [0xAA, 0xBB]);
                reply.copy_from_slice(&[0xCC, 0xDD]);
                true
            },
            &errh,
        );

        assert!(ok);
        assert_eq!(delay.total_ms, 100);
        assert_eq!(serial.outbox.as_slice(), &[0xCC, 0xDD]);
    }

    #[test]
    fn respond_rejects_invalid_ping_without_replying() {
        let mut serial = MockSerial::default();
        serial.push_inbound(&[0x00, 0x00]);
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut ping = [0u8; 2];
        let mut pong = [0u8; 2];
        let ok = respond(&mut serial, &mut delay, &mut ping, &mut pong, 0, 0, |_, _| false, &errh);

        assert!(!ok);
        assert!(serial.outbox.is_empty());
    }

    #[test]
    fn respond_aborts_when_nothing_arrives() {
        let mut serial = MockSerial::default();
        serial.starve_read = true;
        let mut delay = MockDelay::default();
        let errh = ErrorHandler::new();

        let mut ping = [0u8; 2];
        let mut pong = [0u8; 2];
        let ok = respond(&mut serial, &mut delay, &mut ping, &mut pong, 0, 0, |_, _| true, &errh);

        assert!(!ok);
        assert!(errh.shutdown_requested());
    }
}
