//! Dual-processor boot protocol and safe-node state handling.
//!
//! uP-Master and uP-Slave run the same three-stage boot sequence
//! ([`pingpong`] framing underlying both [`handshake`] and [`sync`]) before
//! handing control to the cyclic PSI exchange; [`state`] then tracks the SN
//! through the openSAFETY lifecycle for as long as the node runs.

/// Which side of the dual-processor link this instance is running on.
/// `boot/handshake-ma.c`/`boot/handshake-sl.c` and their `sync`/`pingpong`
/// counterparts are separate translation units per role in the original;
/// this crate keeps the functions split the same way (`perform` vs
/// `perform_master`, `wait_slave` vs `wait_master`) and uses `Role` only
/// where a caller needs to pick between them at runtime rather than at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

pub mod handshake;
pub mod pingpong;
pub mod state;
pub mod sync;

use crate::config;
use crate::constime::ConsecutiveTime;
use crate::error::ErrorHandler;
use crate::platform::{DelayMs, HardwareCounter, InterruptCtrl, SerialLink};

/// Runs the slave side of the full boot sequence: the welcome/response
/// handshake ([`handshake::perform`]) followed by the ready/sync wait
/// ([`sync::wait_slave`]), using this crate's own configured timeouts
/// (spec.md §3 supplement — `RESPONSE_TIMEOUT_MS`) rather than leaving a
/// target's boot code to pick a value. Returns the handshake's SOD restore
/// hint once both stages have completed.
pub fn run_slave_boot<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    local_sn_state: u8,
    cons_time: &ConsecutiveTime,
    errh: &ErrorHandler,
) -> Option<handshake::SodRestoreHint> {
    let hint = handshake::perform(
        serial,
        delay,
        local_sn_state,
        config::RESPONSE_TIMEOUT_MS,
        config::PINGPONG_SLAVE_ARM_DELAY_MS,
        errh,
    )?;
    if !sync::wait_slave(serial, delay, cons_time, errh) {
        return None;
    }
    Some(hint)
}

/// Master-side counterpart of [`run_slave_boot`]: [`handshake::perform_master`]
/// (which waits for the welcome message up to `WELCOME_RCV_TIMEOUT_MS`)
/// followed by [`sync::wait_master`].
pub fn run_master_boot<S: SerialLink>(
    serial: &mut S,
    delay: &mut impl DelayMs,
    local_sn_state: u8,
    irq: &mut impl InterruptCtrl,
    cons_time: &ConsecutiveTime,
    counter: &impl HardwareCounter,
    errh: &ErrorHandler,
) -> Option<handshake::SodRestoreHint> {
    let hint = handshake::perform_master(
        serial,
        delay,
        local_sn_state,
        config::PINGPONG_MASTER_ARM_DELAY_MS,
        errh,
    )?;
    if !sync::wait_master(serial, delay, irq, cons_time, counter, errh) {
        return None;
    }
    Some(hint)
}
