//! Handshake (C13): the first boot exchange between uP-Master and uP-Slave.
//!
//! Grounded on `boot/handshake-sl.c`: this processor sends a welcome message
//! carrying a version marker and its current SN state, and waits for a
//! response that must echo the same marker back. `hands_fillStateField`
//! decides whether the SOD should be restored from its persisted image or
//! rebuilt from defaults, based on the SN state the other side reports —
//! modeled here as [`SodRestoreHint`] rather than a raw `BOOLEAN*` out
//! parameter.
//!
//! The wire layout (4-byte header, 1-byte state) is inferred from the field
//! order `tWelcMsg`/`tRespMsg` are filled in (`msgHeader_m` then
//! `snState_m`); no original header defining the exact struct was available
//! in this set of sources.

use crate::codec;
use crate::config::WELCOME_MSG_CONTENT;
use crate::error::{ErrSource, ErrorCode, ErrorHandler};
use crate::platform::{DelayMs, SerialLink};
use crate::sn::pingpong;

const HEADER_OFFSET: usize = 0;
const STATE_OFFSET: usize = 4;
pub const MESSAGE_LEN: usize = 5;

/// Whether the SOD should be restored from flash, mirroring the
/// `BOOLEAN * pRestoreSod_p` out-parameter threaded through `hands_perform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SodRestoreHint {
    Restore,
    UseDefaults,
}

/// `hands_verifySnStateField`: the remote side's state decides the restore
/// hint. A remote already in pre-operational or operational implies this
/// side is rejoining a running bus and should restore its persisted SOD;
/// anything else (including booting) implies a cold start.
fn restore_hint_from_remote_state(remote_state: u8) -> SodRestoreHint {
    match remote_state {
        2 | 3 => SodRestoreHint::Restore,
        _ => SodRestoreHint::UseDefaults,
    }
}

/// Carries out the welcome/response exchange. `local_sn_state` is this
/// processor's own state, stamped into the outgoing welcome message.
pub fn perform<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    local_sn_state: u8,
    response_timeout_ms: u32,
    arm_delay_ms: u32,
    errh: &ErrorHandler,
) -> Option<SodRestoreHint> {
    let mut welcome = [0u8; MESSAGE_LEN];
    codec::set_u32_le(&mut welcome[HEADER_OFFSET..], WELCOME_MSG_CONTENT);
    welcome[STATE_OFFSET] = local_sn_state;

    let mut response = [0u8; MESSAGE_LEN];
    let mut hint = None;

    let ok = pingpong::transfer(
        serial,
        delay,
        &welcome,
        &mut response,
        response_timeout_ms,
        arm_delay_ms,
        |buf| {
            if buf.len() != MESSAGE_LEN {
                errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::ReceiveBufferInvalid, 0);
                return false;
            }
            if codec::get_u32_le(&buf[HEADER_OFFSET..]) != WELCOME_MSG_CONTENT {
                errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::ResponseMsgInvalid, 0);
                return false;
            }
            hint = Some(restore_hint_from_remote_state(buf[STATE_OFFSET]));
            true
        },
        errh,
    );

    if ok {
        hint
    } else {
        None
    }
}

/// Master-side counterpart of [`perform`]. Busy-waits for the slave's
/// welcome message, echoes its header back together with this processor's
/// own `local_sn_state`, stamped into the response the same way
/// `fillResponseMsg` copies the welcome header into `tRespMsg` in
/// `handshake-ma.c`.
pub fn perform_master<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    local_sn_state: u8,
    arm_delay_ms: u32,
    errh: &ErrorHandler,
) -> Option<SodRestoreHint> {
    let mut welcome = [0u8; MESSAGE_LEN];
    let mut response = [0u8; MESSAGE_LEN];
    let mut hint = None;

    let ok = pingpong::respond(
        serial,
        delay,
        &mut welcome,
        &mut response,
        crate::config::WELCOME_RCV_TIMEOUT_MS,
        arm_delay_ms,
        |welc, resp| {
            if welc.len() != MESSAGE_LEN || codec::get_u32_le(&welc[HEADER_OFFSET..]) != WELCOME_MSG_CONTENT {
                errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::WelcomeMsgInvalid, 0);
                return false;
            }
            hint = Some(restore_hint_from_remote_state(welc[STATE_OFFSET]));
            codec::set_u32_le(&mut resp[HEADER_OFFSET..], WELCOME_MSG_CONTENT);
            resp[STATE_OFFSET] = local_sn_state;
            true
        },
        errh,
    );

    if ok {
        hint
    } else {
        None
    }
}
