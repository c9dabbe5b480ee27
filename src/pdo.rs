//! PDO image exchange (C7): publishes the mapped input image (RPDO) to the
//! application and accepts the mapped output image (TPDO) back, once per
//! cycle.
//!
//! Grounded on `libs/psi/pdo.c`. There the user callback is the process
//! image's only consumer, registered as the stream engine's single sync
//! callback (`stream_registerSyncCb(pdo_process)`); this crate keeps that
//! arrangement — [`PdoSyncAdapter`] fills the engine's `SyncCallback` slot
//! and forwards into [`Pdo`]. A channel whose buffer id is `None` is the
//! `PDO_CHANNEL_DEACTIVATED` case: the corresponding image is left out of
//! the callback entirely rather than passed as a null pointer.

use core::cell::RefCell;

use crate::codec;
use crate::config;
use crate::stream::{Action, BufferSource, SyncCallback};
use crate::tbuf::AckRegister;

/// Width of the relative-time header prefixed to the RPDO buffer ahead of
/// the mapped object list.
const RPDO_HEADER_SIZE: u32 = 4;

/// The application's process-image callback, invoked once per cycle with
/// the current relative time and whichever of the input/output images are
/// active.
pub trait PdoCallback {
    fn process(&mut self, rel_time_low: u32, rpdo: Option<&[u8]>, tpdo: Option<&mut [u8]>) -> bool;
}

/// Output-publish strategy (`shnftx-single.c` vs `shnftx-dual.c`). `Dual`
/// additionally mirrors the just-published TPDO image to a second buffer
/// id, for a redundant output stage to compare lock-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TpdoStrategy {
    Single,
    Dual { mirror_id: u8 },
}

/// Holds the fixed buffer-id wiring and the last decoded relative time;
/// shared by its decode/ack actions and its sync adapter through `RefCell`s
/// rather than requiring them to coexist as exclusive borrows.
pub struct Pdo<'a> {
    rpdo_id: Option<u8>,
    tpdo_id: Option<u8>,
    strategy: TpdoStrategy,
    rel_time_low: RefCell<u32>,
    callback: RefCell<&'a mut dyn PdoCallback>,
}

impl<'a> Pdo<'a> {
    pub fn new(rpdo_id: Option<u8>, tpdo_id: Option<u8>, callback: &'a mut dyn PdoCallback) -> Self {
        Self {
            rpdo_id,
            tpdo_id,
            strategy: TpdoStrategy::Single,
            rel_time_low: RefCell::new(0),
            callback: RefCell::new(callback),
        }
    }

    /// Switches this instance to the dual-redundant output strategy,
    /// mirroring the TPDO image to `mirror_id` every cycle after the sync
    /// callback has filled it.
    pub fn with_dual_mirror(mut self, mirror_id: u8) -> Self {
        self.strategy = TpdoStrategy::Dual { mirror_id };
        self
    }

    pub fn strategy(&self) -> TpdoStrategy {
        self.strategy
    }

    fn decode_rpdo(&self, buf: &[u8]) -> bool {
        if buf.len() < RPDO_HEADER_SIZE as usize {
            return false;
        }
        *self.rel_time_low.borrow_mut() = codec::get_u32_le(buf);
        true
    }

    /// Copies the current TPDO buffer's contents into `mirror_id` through a
    /// stack scratch copy, since [`BufferSource`] only hands out two
    /// disjoint buffers at once (via [`BufferSource::split_pair_mut`]) and
    /// the TPDO/mirror pair is not known to the engine ahead of time.
    fn mirror_tpdo(&self, source: &mut dyn BufferSource, tpdo_id: u8, mirror_id: u8) {
        let mut scratch = [0u8; config::PDO_IMAGE_MAX_SIZE];
        let copied = match source.buffer_mut(tpdo_id) {
            Some(buf) => {
                let len = buf.len().min(scratch.len());
                scratch[..len].copy_from_slice(&buf[..len]);
                len
            }
            None => return,
        };
        if let Some(mirror) = source.buffer_mut(mirror_id) {
            let len = copied.min(mirror.len());
            mirror[..len].copy_from_slice(&scratch[..len]);
        }
    }

    fn run_cycle(&self, source: &mut dyn BufferSource) -> bool {
        let rel_time_low = *self.rel_time_low.borrow();
        let ok = {
            let mut cb = self.callback.borrow_mut();
            match (self.rpdo_id, self.tpdo_id) {
                (None, None) => cb.process(rel_time_low, None, None),
                (None, Some(tid)) => cb.process(rel_time_low, None, source.buffer_mut(tid)),
                (Some(rid), None) => {
                    let rpdo = source.buffer_mut(rid).map(|b| &b[RPDO_HEADER_SIZE as usize..] as &[u8]);
                    cb.process(rel_time_low, rpdo, None)
                }
                (Some(rid), Some(tid)) => {
                    let (rpdo_buf, tpdo_buf) = source.split_pair_mut(rid, tid);
                    let rpdo = rpdo_buf.map(|b| &b[RPDO_HEADER_SIZE as usize..] as &[u8]);
                    cb.process(rel_time_low, rpdo, tpdo_buf)
                }
            }
        };

        if !ok {
            return false;
        }

        if let (Some(tid), TpdoStrategy::Dual { mirror_id }) = (self.tpdo_id, self.strategy) {
            self.mirror_tpdo(source, tid, mirror_id);
        }

        true
    }
}

/// Pre-action on the `RpdoImage` buffer: decodes the relative time header
/// and releases the buffer.
pub struct RpdoDecodeAckAction<'a, 'b> {
    pub pdo: &'a Pdo<'b>,
    pub buffer_id: u8,
}

impl<'a, 'b> Action for RpdoDecodeAckAction<'a, 'b> {
    fn run(&mut self, buf: &mut [u8], ack: &mut AckRegister) -> bool {
        if !self.pdo.decode_rpdo(buf) {
            return false;
        }
        ack.clear(self.buffer_id);
        true
    }
}

/// Post-action on the `TpdoImage` buffer: the sync callback has already
/// written the output image in place, so this only releases the buffer.
pub struct TpdoAckAction {
    pub buffer_id: u8,
}

impl Action for TpdoAckAction {
    fn run(&mut self, _buf: &mut [u8], ack: &mut AckRegister) -> bool {
        ack.clear(self.buffer_id);
        true
    }
}

/// Fills the stream engine's single sync-callback slot on behalf of [`Pdo`].
pub struct PdoSyncAdapter<'a, 'b> {
    pub pdo: &'a Pdo<'b>,
}

impl<'a, 'b> SyncCallback for PdoSyncAdapter<'a, 'b> {
    fn run(&mut self, source: &mut dyn BufferSource) -> bool {
        self.pdo.run_cycle(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingCallback {
        calls: u32,
        last_rel_time: u32,
        last_rpdo_first_byte: Option<u8>,
        wrote_tpdo: bool,
    }

    impl PdoCallback for RecordingCallback {
        fn process(&mut self, rel_time_low: u32, rpdo: Option<&[u8]>, tpdo: Option<&mut [u8]>) -> bool {
            self.calls += 1;
            self.last_rel_time = rel_time_low;
            self.last_rpdo_first_byte = rpdo.map(|r| r[0]);
            if let Some(t) = tpdo {
                t[0] = 0xAB;
                self.wrote_tpdo = true;
            }
            true
        }
    }

    struct TwoBufSource {
        rpdo: [u8; 8],
        tpdo: [u8; 4],
    }

    impl BufferSource for TwoBufSource {
        fn buffer_mut(&mut self, id: u8) -> Option<&mut [u8]> {
            match id {
                0 => Some(&mut self.rpdo),
                1 => Some(&mut self.tpdo),
                _ => None,
            }
        }

        fn split_pair_mut(&mut self, a: u8, b: u8) -> (Option<&mut [u8]>, Option<&mut [u8]>) {
            if a == 0 && b == 1 {
                (Some(&mut self.rpdo), Some(&mut self.tpdo))
            } else {
                (None, None)
            }
        }
    }

    #[test]
    fn decode_rpdo_caches_rel_time() {
        let mut cb = RecordingCallback { calls: 0, last_rel_time: 0, last_rpdo_first_byte: None, wrote_tpdo: false };
        let pdo = Pdo::new(Some(0), Some(1), &mut cb);
        let mut buf = [0u8; 8];
        codec::set_u32_le(&mut buf, 0x1234);
        let mut ack = AckRegister::new();
        let mut action = RpdoDecodeAckAction { pdo: &pdo, buffer_id: 0 };
        assert!(action.run(&mut buf, &mut ack));
        assert!(!ack.is_set(0));
        assert_eq!(*pdo.rel_time_low.borrow(), 0x1234);
    }

    #[test]
    fn sync_adapter_forwards_both_images_when_active() {
        let mut cb = RecordingCallback { calls: 0, last_rel_time: 0, last_rpdo_first_byte: None, wrote_tpdo: false };
        let pdo = Pdo::new(Some(0), Some(1), &mut cb);
        *pdo.rel_time_low.borrow_mut() = 0x55;

        let mut source = TwoBufSource { rpdo: [0xFF; 8], tpdo: [0; 4] };
        let mut adapter = PdoSyncAdapter { pdo: &pdo };
        assert!(adapter.run(&mut source));
        assert_eq!(source.tpdo[0], 0xAB);
    }

    struct RpdoPresenceCallback;

    impl PdoCallback for RpdoPresenceCallback {
        fn process(&mut self, _rel_time_low: u32, rpdo: Option<&[u8]>, tpdo: Option<&mut [u8]>) -> bool {
            if let Some(t) = tpdo {
                t[0] = if rpdo.is_some() { 1 } else { 2 };
            }
            true
        }
    }

    #[test]
    fn deactivated_rpdo_passes_none() {
        let mut cb = RpdoPresenceCallback;
        let pdo = Pdo::new(None, Some(1), &mut cb);
        let mut source = TwoBufSource { rpdo: [0xFF; 8], tpdo: [0; 4] };
        let mut adapter = PdoSyncAdapter { pdo: &pdo };
        assert!(adapter.run(&mut source));
        assert_eq!(source.tpdo[0], 2);
    }

    #[test]
    fn tpdo_ack_action_clears_its_bit() {
        let mut ack = AckRegister::new();
        let mut buf = [0u8; 4];
        let mut action = TpdoAckAction { buffer_id: 2 };
        assert!(action.run(&mut buf, &mut ack));
        assert!(!ack.is_set(2));
    }

    struct ThreeBufSource {
        rpdo: [u8; 8],
        tpdo: [u8; 4],
        mirror: [u8; 4],
    }

    impl BufferSource for ThreeBufSource {
        fn buffer_mut(&mut self, id: u8) -> Option<&mut [u8]> {
            match id {
                0 => Some(&mut self.rpdo),
                1 => Some(&mut self.tpdo),
                2 => Some(&mut self.mirror),
                _ => None,
            }
        }

        fn split_pair_mut(&mut self, a: u8, b: u8) -> (Option<&mut [u8]>, Option<&mut [u8]>) {
            if a == 0 && b == 1 {
                (Some(&mut self.rpdo), Some(&mut self.tpdo))
            } else {
                (None, None)
            }
        }
    }

    #[test]
    fn dual_strategy_mirrors_tpdo_to_second_buffer() {
        let mut cb = RecordingCallback { calls: 0, last_rel_time: 0, last_rpdo_first_byte: None, wrote_tpdo: false };
        let pdo = Pdo::new(Some(0), Some(1), &mut cb).with_dual_mirror(2);
        assert_eq!(pdo.strategy(), TpdoStrategy::Dual { mirror_id: 2 });

        let mut source = ThreeBufSource { rpdo: [0xFF; 8], tpdo: [0; 4], mirror: [0; 4] };
        let mut adapter = PdoSyncAdapter { pdo: &pdo };
        assert!(adapter.run(&mut source));

        assert_eq!(source.tpdo[0], 0xAB);
        assert_eq!(source.mirror, source.tpdo);
    }

    #[test]
    fn single_strategy_leaves_other_buffers_untouched() {
        let mut cb = RecordingCallback { calls: 0, last_rel_time: 0, last_rpdo_first_byte: None, wrote_tpdo: false };
        let pdo = Pdo::new(Some(0), Some(1), &mut cb);
        assert_eq!(pdo.strategy(), TpdoStrategy::Single);

        let mut source = ThreeBufSource { rpdo: [0xFF; 8], tpdo: [0; 4], mirror: [0x11; 4] };
        let mut adapter = PdoSyncAdapter { pdo: &pdo };
        assert!(adapter.run(&mut source));

        assert_eq!(source.tpdo[0], 0xAB);
        assert_eq!(source.mirror, [0x11; 4]);
    }
}
