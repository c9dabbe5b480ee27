//! SN state handler (C17): tracks this safety node's position in the
//! openSAFETY lifecycle and drives the two state transitions an external
//! SNMTS stack can request.
//!
//! Grounded on `demo-sn-gpio/statehandler.c`. `stateh_handleStateChange`
//! checks the enter-operational flag ahead of the enter-pre-operational
//! one, so a request to go operational always wins a same-cycle race; this
//! crate keeps that priority. The shutdown flag the original stores
//! alongside the other two (`fShutdown_m`) is not duplicated here —
//! [`crate::error::ErrorHandler::shutdown_requested`] is already the one
//! place every module reports fatal conditions to, so a second flag here
//! would just be a second source of truth for the same fact.

use crate::error::{ErrSource, ErrorCode, ErrorHandler};

/// Mirrors `tSnState`. Ordered `Booting < Initialization < PreOperational <
/// Operational` the way the original's `enum` is implicitly ordered, though
/// nothing in this crate currently compares states by order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SnState {
    Booting,
    Initialization,
    PreOperational,
    Operational,
}

/// The external openSAFETY stack's state-transition entry points
/// (`SNMTS_PerformTransPreOp`/`SNMTS_EnterOpState`), modeled as a trait
/// since this crate's non-goals exclude reimplementing SNMTS itself.
pub trait SnmtsTransitions {
    /// Requests the pre-operational transition, stamped with the current
    /// consecutive time.
    fn perform_trans_pre_op(&mut self, cons_time: u32) -> bool;

    /// Requests the operational transition. `Err` carries the SNMTS error
    /// group/code pair the original packs into one `additional_info` word.
    fn enter_op_state(&mut self) -> Result<(), (u8, u8)>;
}

/// Tracks the current SN state plus the two pending-transition flags an
/// external event (e.g. an SNMT command frame) sets to request a move.
pub struct StateHandler {
    state: SnState,
    enter_preop: bool,
    enter_op: bool,
}

impl StateHandler {
    pub fn new(initial: SnState) -> Self {
        Self { state: initial, enter_preop: false, enter_op: false }
    }

    pub fn state(&self) -> SnState {
        self.state
    }

    pub fn set_state(&mut self, state: SnState) {
        self.state = state;
    }

    pub fn request_enter_preop(&mut self) {
        self.enter_preop = true;
    }

    pub fn request_enter_op(&mut self) {
        self.enter_op = true;
    }

    pub fn enter_preop_requested(&self) -> bool {
        self.enter_preop
    }

    pub fn enter_op_requested(&self) -> bool {
        self.enter_op
    }

    /// `stateh_handleStateChange`: runs at most one transition per call, the
    /// operational request taking priority over the pre-operational one.
    /// With neither flag set this is a no-op that reports success, matching
    /// the original's "no state change in this cycle" branch.
    pub fn handle_state_change(
        &mut self,
        transitions: &mut impl SnmtsTransitions,
        cons_time: u32,
        errh: &ErrorHandler,
    ) -> bool {
        if self.enter_op {
            self.enter_operational(transitions, errh)
        } else if self.enter_preop {
            self.enter_pre_operational(transitions, cons_time, errh)
        } else {
            true
        }
    }

    /// `stateh_enterPreOperational`.
    pub fn enter_pre_operational(
        &mut self,
        transitions: &mut impl SnmtsTransitions,
        cons_time: u32,
        errh: &ErrorHandler,
    ) -> bool {
        let ok = if transitions.perform_trans_pre_op(cons_time) {
            self.state = SnState::PreOperational;
            true
        } else {
            errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::EnterPreOpFailed, 0);
            false
        };
        self.enter_preop = false;
        ok
    }

    /// `enterOperational` (private in the original; exposed here since this
    /// crate has no internal/public module split within `sn::state`).
    fn enter_operational(&mut self, transitions: &mut impl SnmtsTransitions, errh: &ErrorHandler) -> bool {
        let ok = match transitions.enter_op_state() {
            Ok(()) => {
                self.state = SnState::Operational;
                true
            }
            Err((grp, code)) => {
                let info = (grp as u32) << 8 | code as u32;
                errh.post_fatal(ErrSource::Periph, Default::default(), ErrorCode::EnterOpFailed, info);
                false
            }
        };
        self.enter_op = false;
        ok
    }
}
