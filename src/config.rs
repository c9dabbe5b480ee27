//! Build-time configuration: channel counts, timeouts, cycle-time bounds.
//!
//! Mirrors the compile-time constants of the original `psicommon`/`sn`
//! sources (`CONF_CHAN_NUM_OBJECTS`, `CC_TX_TIMEOUT_CYCLE_COUNT`, ...);
//! callers that need different values define their own `Config` and pass
//! it to [`crate::framework::Framework::with_config`].

/// Maximum number of objects held by the configuration channel's object list.
pub const CONF_CHAN_NUM_OBJECTS: usize = 64;

/// Cycles without a confirming status flag before a CC write is force-unlocked.
///
/// Not specified in the reviewed original sources; chosen as a reasonable
/// default for a channel that carries configuration data, not cyclic I/O.
pub const CC_TX_TIMEOUT_CYCLE_COUNT: u32 = 50;

/// Cycles without an acknowledging status flag before an SSDO post is force-unlocked.
pub const SSDO_TX_TIMEOUT_CYCLE_COUNT: u32 = 50;

/// Cycles without an acknowledging status flag before a logbook post is force-unlocked.
///
/// Longer than the cyclic channels: diagnostic posts are lower priority than
/// configuration or service data.
pub const LOG_TX_TIMEOUT_CYCLE_COUNT: u32 = 100;

/// Cycle-time learning threshold (µs): two successive cycle times within this
/// delta of each other are considered stable.
pub const CYCLE_TIME_THRESHOLD_US: u32 = 10;

/// Minimum legal cycle time (µs).
pub const CYCLE_TIME_MIN_US: u32 = 400;

/// Maximum legal cycle time (µs); bounded by the 16-bit microsecond counter.
pub const CYCLE_TIME_MAX_US: u32 = 65_000;

/// Grace period (µs) beyond one learned cycle before a missing sync is a timeout.
pub const CYCLE_TIME_TIMEOUT_US: u32 = 100;

/// Default consecutive-time divider: wire unit is 100 µs.
pub const CONSTIME_DEFAULT_DIVIDER: u32 = 100;

/// Legal consecutive-time divider values.
pub const CONSTIME_VALID_DIVIDERS: [u32; 4] = [1, 10, 100, 1000];

/// Protocol version marker exchanged in the SN welcome/response handshake.
pub const WELCOME_MSG_CONTENT: u32 = 0x1979_0958;

/// Marker exchanged in the SN ready/sync handshake that follows the welcome
/// exchange, carried over the same header field as [`WELCOME_MSG_CONTENT`]
/// but distinct so a ready message can't be mistaken for a stale welcome.
pub const READY_MSG_CONTENT: u32 = 0x2043_0964;

/// Slave-side receive timeout for the sync response following the ready message.
pub const SYNC_RESPONSE_TIMEOUT_MS: u32 = 0x2000;

/// Master-side receive timeout for the welcome message: effectively unbounded,
/// matching `WELCOME_RCV_TIMEOUT_MS = 0xFFFFF` in the original handshake master.
pub const WELCOME_RCV_TIMEOUT_MS: u32 = 0xF_FFFF;

/// Slave-side receive timeout for the handshake response.
pub const RESPONSE_TIMEOUT_MS: u32 = 0x2000;

/// Delay the ping/pong master waits after verifying the welcome before sending
/// its response, giving the slave time to arm its receiver.
pub const PINGPONG_MASTER_ARM_DELAY_MS: u32 = 100;

/// Delay the ping/pong slave sleeps before transmitting its ping.
pub const PINGPONG_SLAVE_ARM_DELAY_MS: u32 = 100;

/// Hard total of FIFO instances across the whole system (not per subsystem).
pub const FIFO_MAX_INSTANCES: usize = 4;

/// Largest TPDO image this crate will mirror for the dual-redundant output
/// strategy (`shnftx-dual.c`). Sized generously for a safety process image;
/// a target with a larger mapped output would need a larger scratch buffer
/// than [`crate::pdo::Pdo::with_dual_mirror`] carries on its stack.
pub const PDO_IMAGE_MAX_SIZE: usize = 256;

static_assertions::const_assert!(PDO_IMAGE_MAX_SIZE >= 4);
static_assertions::const_assert!(FIFO_MAX_INSTANCES > 0);
static_assertions::const_assert!(CYCLE_TIME_MIN_US < CYCLE_TIME_MAX_US);

/// Settle delay the sync-wait master sleeps between catching the sync
/// interrupt and sending its reply. `sync-ma.c`'s `readyReceived` sends the
/// response immediately with no settle delay, unlike the handshake's
/// `handshake-ma.c`, which sleeps 100 ms first.
pub const SYNC_READY_ARM_DELAY_MS: u32 = 0;

/// Bitmask identifying which optional subsystems a [`crate::framework::Framework`]
/// instance enables, stamped onto every [`crate::error::ErrorDesc`] so a host
/// can tell which subsystem raised an error even when [`crate::error::ErrSource`]
/// is coarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleMask(pub u32);

impl ModuleMask {
    pub const STATUS: u32 = 1 << 0;
    pub const CC: u32 = 1 << 1;
    pub const PDO: u32 = 1 << 2;
    pub const SSDO: u32 = 1 << 3;
    pub const LOGBOOK: u32 = 1 << 4;

    pub const ALL: ModuleMask = ModuleMask(Self::STATUS | Self::CC | Self::PDO | Self::SSDO | Self::LOGBOOK);

    pub const fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

impl Default for ModuleMask {
    fn default() -> Self {
        ModuleMask::ALL
    }
}

/// Top-level framework configuration, analogous to the teacher's
/// `sysctl::Config`/`uart::Config` builder structs.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Subsystems to initialize.
    pub enabled_modules: ModuleMask,
    /// Number of SSDO channel instances to create.
    pub ssdo_channel_count: usize,
    /// Number of logbook channel instances to create.
    pub logbook_channel_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_modules: ModuleMask::default(),
            ssdo_channel_count: 1,
            logbook_channel_count: 1,
        }
    }
}
