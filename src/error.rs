//! Central error dispatch (C18).
//!
//! Every module reports into an [`ErrorHandler`] instead of panicking.
//! `Fatal` raises `shutdown`; `FailSafe` additionally raises `fail_safe`,
//! which diverts the SN state machine to the safe state. Reports are
//! forwarded through the logbook channel when one is attached; if the
//! logbook is busy the report is still logged locally and counted in
//! `lost_errors`.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::config::ModuleMask;

/// A logbook channel `ErrorHandler` can forward reports into. Implemented
/// for [`crate::logbook::Logbook`] so `post_info`/`post_minor`/`post_fatal`
/// can reach a concrete channel without `ErrorHandler` itself being generic
/// over the logbook's context-byte size.
pub trait LogbookSink {
    fn post_error(&self, desc: ErrorDesc) -> bool;
}

/// Coarse origin of a reported error, mirroring `tErrSource` in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrSource {
    Invalid,
    Eps,
    Hnf,
    Shnf,
    Sapl,
    Periph,
}

/// Error severity. `FailSafe` is carried as a flag orthogonal to level in the
/// original; here it is folded into the enum since every reporting call site
/// in this crate already knows statically whether it is fail-safe-worthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    Info,
    Minor,
    Fatal,
    FailSafe,
}

/// Error taxonomy tags (spec.md §7), not a type per failure — the disposition
/// is carried by [`Severity`], not inferred from the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum ErrorCode {
    InvalidParameter,
    BufferSizeMismatch,
    InvalidBuffer,
    ProcessSyncFailed,
    ChannelBusy,
    Timeout,
    ReceiveBufferInvalid,
    WelcomeMsgInvalid,
    ResponseMsgInvalid,
    ReadyMsgInvalid,
    SerialTransmitFailed,
    SerialReceiveFailed,
    CycleMonStateInvalid,
    EnterPreOpFailed,
    EnterOpFailed,
}

/// One reported error, analogous to `tErrorDesc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorDesc {
    pub source: ErrSource,
    pub severity: Severity,
    pub module: ModuleMask,
    pub code: ErrorCode,
    pub additional_info: u32,
}

/// Central severity dispatcher.
///
/// `shutdown`/`fail_safe` are `AtomicBool` rather than the original's
/// `BOOLEAN*` pointers handed in at init, since both the sync ISR and the
/// foreground loop observe them concurrently. `logbook` is behind the same
/// `critical_section::Mutex<Cell<_>>` pattern [`crate::constime::ConsecutiveTime`]
/// uses for state read from more than one context: it is bound once, during
/// start-up (`errorhandler_init`'s `logbook_post` hookup), and read on every
/// subsequent `post_info`/`post_minor`/`post_fatal` call.
pub struct ErrorHandler<'a> {
    shutdown: AtomicBool,
    fail_safe: AtomicBool,
    lost_errors: AtomicU32,
    logbook: Mutex<Cell<Option<&'a dyn LogbookSink>>>,
}

impl<'a> ErrorHandler<'a> {
    pub const fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            fail_safe: AtomicBool::new(false),
            lost_errors: AtomicU32::new(0),
            logbook: Mutex::new(Cell::new(None)),
        }
    }

    /// Binds the logbook channel `post_info`/`post_minor`/`post_fatal` will
    /// forward reports into. Unbound (the default after [`Self::new`]), a
    /// report is dispatched locally but never forwarded, and is not counted
    /// in `lost_errors` since there is no channel to have been busy.
    pub fn bind_logbook(&self, logbook: &'a dyn LogbookSink) {
        critical_section::with(|cs| self.logbook.borrow(cs).set(Some(logbook)));
    }

    /// As [`Self::new`], already bound to `logbook`.
    pub fn with_logbook(logbook: &'a dyn LogbookSink) -> Self {
        let this = Self::new();
        this.bind_logbook(logbook);
        this
    }

    /// Reports an error. `logbook_post` attempts to forward the report to the
    /// PLC via the logbook channel; it returns `false` if the channel was
    /// busy, in which case `lost_errors` is incremented but the error is
    /// still dispatched locally.
    pub fn post(&self, desc: ErrorDesc, logbook_post: impl FnOnce(ErrorDesc) -> bool) {
        #[cfg(feature = "defmt")]
        match desc.severity {
            Severity::Info => defmt::info!("psi error: {:?}", desc),
            Severity::Minor => defmt::warn!("psi error: {:?}", desc),
            Severity::Fatal | Severity::FailSafe => defmt::error!("psi error: {:?}", desc),
        }

        match desc.severity {
            Severity::Fatal => self.shutdown.store(true, Ordering::SeqCst),
            Severity::FailSafe => {
                self.shutdown.store(true, Ordering::SeqCst);
                self.fail_safe.store(true, Ordering::SeqCst);
            }
            Severity::Info | Severity::Minor => {}
        }

        if !logbook_post(desc) {
            self.lost_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Forwards `desc` into the bound logbook, if any, the way `post_info`/
    /// `post_minor`/`post_fatal` all do. An unbound handler accepts every
    /// report without forwarding it, so an application that never wires a
    /// logbook channel doesn't spuriously accumulate `lost_errors`.
    fn post_via_bound_logbook(&self, desc: ErrorDesc) {
        let sink = critical_section::with(|cs| self.logbook.borrow(cs).get());
        self.post(desc, |d| sink.map(|s| s.post_error(d)).unwrap_or(true));
    }

    #[inline]
    pub fn post_info(&self, source: ErrSource, module: ModuleMask, code: ErrorCode, additional_info: u32) {
        self.post_via_bound_logbook(ErrorDesc {
            source,
            severity: Severity::Info,
            module,
            code,
            additional_info,
        });
    }

    #[inline]
    pub fn post_minor(&self, source: ErrSource, module: ModuleMask, code: ErrorCode, additional_info: u32) {
        self.post_via_bound_logbook(ErrorDesc {
            source,
            severity: Severity::Minor,
            module,
            code,
            additional_info,
        });
    }

    #[inline]
    pub fn post_fatal(&self, source: ErrSource, module: ModuleMask, code: ErrorCode, additional_info: u32) {
        self.post_via_bound_logbook(ErrorDesc {
            source,
            severity: Severity::Fatal,
            module,
            code,
            additional_info,
        });
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn fail_safe_requested(&self) -> bool {
        self.fail_safe.load(Ordering::SeqCst)
    }

    pub fn lost_errors(&self) -> u32 {
        self.lost_errors.load(Ordering::Relaxed)
    }
}

impl<'a> Default for ErrorHandler<'a> {
    fn default() -> Self {
        Self::new()
    }
}
