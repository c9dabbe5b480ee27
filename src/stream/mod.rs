//! Stream engine (C5): descriptor-driven batch transfer between the local
//! mirror and shared memory, with pre/post action dispatch around one user
//! sync callback.
//!
//! The C source's void-pointer action lists (`tbuf_addInstance`'s callback
//! table in `pcp/psi/tbuf.c`) become a tagged handler table per the design
//! note in spec.md §9: each action is a `&mut dyn Action` over a finite,
//! statically-sized registration table (`MAX_ACTIONS`), not a
//! pointer-to-function/void-pointer pair.

use heapless::Vec;

use crate::tbuf::{AckRegister, BufferDescriptor};

/// One pre- or post-action invoked with the base/size of the buffer it was
/// registered against, plus the engine's ACK register. Not every action
/// needs to touch `ack` — only the one responsible for releasing its
/// buffer back to the transport calls `ack.clear(id)`, mirroring the
/// original's per-module `stream_ackBuffer` calls rather than an
/// engine-wide auto-ack.
pub trait Action {
    /// Runs the action against `buf`. Returning `false` aborts the current
    /// cycle (spec.md §4.1 "Failure semantics").
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool;
}

/// The one-shot DMA/SPI round trip that moves data between the local mirror
/// and the remote endpoint.
pub trait StreamHandler {
    fn transfer(&mut self) -> bool;
}

/// The single per-cycle sync callback (the PDO exchange occupies this slot,
/// matching the original's one `stream_registerSyncCb` caller). Takes the
/// same buffer source as actions so it can reach the RPDO/TPDO images
/// directly rather than through a copy.
pub trait SyncCallback {
    fn run(&mut self, source: &mut dyn BufferSource) -> bool;
}

/// Supplies the backing bytes for a registered buffer id, on demand, each
/// time an action needs them. The engine itself does not own shared memory
/// (ownership lives in the [`crate::framework::Framework`] composition
/// root); this trait is the seam between the two.
pub trait BufferSource {
    fn buffer_mut(&mut self, id: u8) -> Option<&mut [u8]>;

    /// Two independent mutable views into buffers `a` and `b`, for the one
    /// sync callback that needs both an input and an output image live at
    /// once (the PDO exchange). `a == b` yields `(None, None)`. Each
    /// implementor must derive this from its own disjoint storage, since a
    /// default built from two [`Self::buffer_mut`] calls would need two
    /// overlapping `&mut self` borrows.
    fn split_pair_mut(&mut self, a: u8, b: u8) -> (Option<&mut [u8]>, Option<&mut [u8]>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    ActionTableFull,
    SyncCallbackAlreadyRegistered,
    NoStreamHandler,
    UnknownBuffer,
    ActionFailed,
    StreamHandlerFailed,
    SyncCallbackFailed,
}

struct ActionEntry<'a> {
    phase: Phase,
    buffer_id: u8,
    action: &'a mut dyn Action,
}

/// Descriptor-driven batch transfer engine. `MAX_BUFFERS` bounds the number
/// of registered buffers, `MAX_ACTIONS` the total pre+post action table
/// size, both sized at compile time (spec.md §5 determinism).
pub struct StreamEngine<'a, const MAX_BUFFERS: usize, const MAX_ACTIONS: usize> {
    descriptors: Vec<BufferDescriptor, MAX_BUFFERS>,
    actions: Vec<ActionEntry<'a>, MAX_ACTIONS>,
    sync_cb: Option<&'a mut dyn SyncCallback>,
    handler: Option<&'a mut dyn StreamHandler>,
    ack: AckRegister,
}

impl<'a, const MAX_BUFFERS: usize, const MAX_ACTIONS: usize> StreamEngine<'a, MAX_BUFFERS, MAX_ACTIONS> {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            actions: Vec::new(),
            sync_cb: None,
            handler: None,
            ack: AckRegister::new(),
        }
    }

    /// Registers buffer `id`'s descriptor. IDs are expected to be assigned
    /// densely from 0, matching the compile-time sub-channel layout of
    /// spec.md §3.
    pub fn register_buffer(&mut self, id: u8, desc: BufferDescriptor) -> Result<(), Error> {
        if id as usize != self.descriptors.len() {
            return Err(Error::UnknownBuffer);
        }
        self.descriptors.push(desc).map_err(|_| Error::ActionTableFull)
    }

    pub fn get_buffer_param(&self, id: u8) -> Option<BufferDescriptor> {
        self.descriptors.get(id as usize).copied()
    }

    pub fn set_stream_handler(&mut self, handler: &'a mut dyn StreamHandler) {
        self.handler = Some(handler);
    }

    /// Installs the application sync callback; exactly one may be registered.
    pub fn register_sync_cb(&mut self, cb: &'a mut dyn SyncCallback) -> Result<(), Error> {
        if self.sync_cb.is_some() {
            return Err(Error::SyncCallbackAlreadyRegistered);
        }
        self.sync_cb = Some(cb);
        Ok(())
    }

    /// Appends an action to buffer `buffer_id`'s pre- or post-list.
    pub fn register_action(&mut self, phase: Phase, buffer_id: u8, action: &'a mut dyn Action) -> Result<(), Error> {
        if buffer_id as usize >= self.descriptors.len() {
            return Err(Error::UnknownBuffer);
        }
        self.actions
            .push(ActionEntry { phase, buffer_id, action })
            .map_err(|_| Error::ActionTableFull)
    }

    /// Clears bit `id` in the ACK register; safe to call from inside any action.
    pub fn ack_buffer(&mut self, id: u8) {
        self.ack.clear(id);
    }

    pub fn ack_register(&self) -> AckRegister {
        self.ack
    }

    fn run_phase(&mut self, phase: Phase, source: &mut dyn BufferSource) -> Result<(), Error> {
        // Ordering across buffers is ascending buffer id; within a buffer,
        // registration order (stable by construction of `actions`).
        let descriptor_count = self.descriptors.len() as u8;
        let Self { actions, ack, .. } = self;
        for bid in 0..descriptor_count {
            for entry in actions.iter_mut() {
                if entry.phase != phase || entry.buffer_id != bid {
                    continue;
                }
                if let Some(buf) = source.buffer_mut(bid) {
                    if !entry.action.run(buf, ack) {
                        return Err(Error::ActionFailed);
                    }
                }
            }
        }
        Ok(())
    }

    /// One full cycle: pre-actions, sync callback, stream handler transfer,
    /// post-actions. Any failure aborts the cycle without an implicit retry
    /// (spec.md §4.1).
    pub fn process_sync(&mut self, source: &mut dyn BufferSource) -> Result<(), Error> {
        self.run_phase(Phase::Pre, source)?;

        if let Some(cb) = self.sync_cb.as_deref_mut() {
            if !cb.run(source) {
                return Err(Error::SyncCallbackFailed);
            }
        }

        match self.handler.as_deref_mut() {
            Some(h) => {
                if !h.transfer() {
                    return Err(Error::StreamHandlerFailed);
                }
            }
            None => return Err(Error::NoStreamHandler),
        }

        self.run_phase(Phase::Post, source)
    }
}

impl<'a, const MAX_BUFFERS: usize, const MAX_ACTIONS: usize> Default
    for StreamEngine<'a, MAX_BUFFERS, MAX_ACTIONS>
{
    fn default() -> Self {
        Self::new()
    }
}
