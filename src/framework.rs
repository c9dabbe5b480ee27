//! Composition root (C11): owns the stream engine and the status channel,
//! and fans `process_async` out across whichever SSDO/logbook channel
//! instances were registered.
//!
//! Grounded on `libs/psi/internal.c`. `psi_init`/`psi_processSync`/
//! `psi_processAsync` there are thin wrappers around `stream_*` plus a
//! compile-time-gated call into `cc_process()`; this crate generalizes the
//! async fan-out to an arbitrary, runtime-registered list of channels
//! through [`AsyncChannel`] rather than one `#if` per subsystem, since the
//! module-enable bitmask (spec.md §3 supplement) already makes the set of
//! active channels a runtime decision. The configuration channel is not a
//! member of that list: its timeout/ack handling runs entirely inside its
//! own pre/post [`crate::stream::Action`]s during `process_sync`, the way
//! `appif-ccobject.c`'s logic is folded into the stream's own buffer
//! callbacks rather than a separate `cc_process` async entry point in this
//! crate's design (see DESIGN.md).

use heapless::Vec;

use crate::config::{Config, ModuleMask};
use crate::error::{ErrSource, ErrorCode, ErrorHandler};
use crate::status::StatusChannel;
use crate::stream::{BufferSource, StreamEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    AsyncChannelTableFull,
}

/// A channel with work to do outside the cyclic sync exchange: unlocking
/// once an acknowledgement or timeout has been observed in the status
/// record. Implemented by [`crate::ssdo::Ssdo`] and [`crate::logbook::Logbook`].
pub trait AsyncChannel {
    fn process(&self, status: &StatusChannel) -> bool;
}

impl<'a, const MAX: usize> AsyncChannel for crate::ssdo::Ssdo<'a, MAX> {
    fn process(&self, status: &StatusChannel) -> bool {
        crate::ssdo::Ssdo::process(self, status)
    }
}

impl<const CTX: usize> AsyncChannel for crate::logbook::Logbook<CTX> {
    fn process(&self, status: &StatusChannel) -> bool {
        crate::logbook::Logbook::process(self, status)
    }
}

/// Ties the stream engine, the status channel and the registered async
/// channels together behind the two calls a target's main loop makes once
/// per cycle: [`Self::process_sync`] from the sync ISR context,
/// [`Self::process_async`] from the foreground loop.
pub struct Framework<'a, 'e, const MAX_BUFFERS: usize, const MAX_ACTIONS: usize, const MAX_ASYNC: usize> {
    stream: StreamEngine<'a, MAX_BUFFERS, MAX_ACTIONS>,
    status: &'a StatusChannel,
    async_channels: Vec<(u32, &'a dyn AsyncChannel), MAX_ASYNC>,
    errh: &'a ErrorHandler<'e>,
    config: Config,
}

impl<'a, 'e, const MAX_BUFFERS: usize, const MAX_ACTIONS: usize, const MAX_ASYNC: usize>
    Framework<'a, 'e, MAX_BUFFERS, MAX_ACTIONS, MAX_ASYNC>
{
    /// `psi_init`: wires the stream engine and status channel together under
    /// the default [`Config`] (all modules enabled).
    pub fn new(status: &'a StatusChannel, errh: &'a ErrorHandler<'e>) -> Self {
        Self::with_config(status, errh, Config::default())
    }

    /// As [`Self::new`], but with a module-enable mask and channel counts
    /// other than the default (spec.md §3 supplement — `PSI_MODULE_*`).
    pub fn with_config(status: &'a StatusChannel, errh: &'a ErrorHandler<'e>, config: Config) -> Self {
        Self {
            stream: StreamEngine::new(),
            status,
            async_channels: Vec::new(),
            errh,
            config,
        }
    }

    /// The underlying stream engine, for registering buffers, actions and
    /// the sync callback ahead of cyclic processing.
    pub fn stream_mut(&mut self) -> &mut StreamEngine<'a, MAX_BUFFERS, MAX_ACTIONS> {
        &mut self.stream
    }

    pub fn status(&self) -> &'a StatusChannel {
        self.status
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Adds a channel to the set [`Self::process_async`] drains every cycle,
    /// tagged with the [`ModuleMask`] bit it is reported under. Registering a
    /// channel for a module the [`Config`] does not enable is accepted (so
    /// callers don't need to special-case construction) but the channel is
    /// then never drained — mirroring the original's `#if PSI_MODULE_SSDO`
    /// compile-time gate as a runtime one instead.
    pub fn register_async_channel(&mut self, module: u32, channel: &'a dyn AsyncChannel) -> Result<(), Error> {
        self.async_channels.push((module, channel)).map_err(|_| Error::AsyncChannelTableFull)
    }

    /// `psi_processSync`: runs one full stream-engine cycle. A failure is
    /// reported to the error handler and propagated as `false`.
    pub fn process_sync(&mut self, source: &mut dyn BufferSource) -> bool {
        if self.stream.process_sync(source).is_err() {
            self.errh.post_fatal(ErrSource::Shnf, ModuleMask::default(), ErrorCode::ProcessSyncFailed, 0);
            return false;
        }
        true
    }

    /// `psi_processAsync`: drains every registered, module-enabled async
    /// channel against the current status record. Unlike `psi_processSync`,
    /// one channel failing does not stop the others from running this cycle.
    pub fn process_async(&self) -> bool {
        let mut all_ok = true;
        for (module, channel) in self.async_channels.iter() {
            if !self.config.enabled_modules.contains(*module) {
                continue;
            }
            if !channel.process(self.status) {
                all_ok = false;
            }
        }
        all_ok
    }
}
