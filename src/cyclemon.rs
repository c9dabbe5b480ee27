//! Cycle monitoring (C16): detects loss of the periodic sync interrupt.
//!
//! Grounded on `cyclemon.c`. `Init` learns a running average of the cycle
//! time (`calculateCycleTime`/`verifyCycleTime`), `Active` refreshes
//! `last_timestamp` on every sync and is polled for timeout from another
//! context (`cyclemon_checkTimeout`), `Timeout` resets back to `Init` on its
//! next `process()` call.

use crate::config::{CYCLE_TIME_MAX_US, CYCLE_TIME_MIN_US, CYCLE_TIME_THRESHOLD_US, CYCLE_TIME_TIMEOUT_US};
use crate::constime::ConsecutiveTime;
use crate::platform::HardwareCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Init,
    Active,
    Timeout,
}

/// Cycle-time learning and timeout state machine. Owns no locking of its
/// own: `process` is called from the sync path, `check_timeout` from the
/// foreground loop, and both read/write through [`ConsecutiveTime`]'s own
/// critical section.
pub struct CycleMonitor {
    state: State,
    last_timestamp: u64,
    cycle_time: u32,
}

impl CycleMonitor {
    pub const fn new() -> Self {
        Self {
            state: State::Init,
            last_timestamp: 0,
            cycle_time: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn reset(&mut self) {
        self.last_timestamp = 0;
        self.cycle_time = 0;
        self.state = State::Init;
    }

    /// `cyclemon_process`: called once per sync cycle.
    pub fn process(&mut self, constime: &ConsecutiveTime, counter: &impl HardwareCounter) -> bool {
        match self.state {
            State::Init => {
                if self.calculate_cycle_time(constime, counter) {
                    if self.cycle_time >= CYCLE_TIME_MIN_US && self.cycle_time <= CYCLE_TIME_MAX_US {
                        self.state = State::Active;
                    }
                }
                true
            }
            State::Active => {
                self.last_timestamp = constime.time_base(counter);
                true
            }
            State::Timeout => {
                self.reset();
                true
            }
        }
    }

    /// `calculateCycleTime`: learns a running average, retrying the cycle
    /// estimate whenever two successive samples diverge by more than
    /// `CYCLE_TIME_THRESHOLD_US`.
    fn calculate_cycle_time(&mut self, constime: &ConsecutiveTime, counter: &impl HardwareCounter) -> bool {
        let now = constime.time_base(counter);
        if self.last_timestamp == 0 {
            self.last_timestamp = now;
            return false;
        }
        let sample = (now - self.last_timestamp) as u32;
        let delta = sample.wrapping_sub(self.cycle_time);
        self.last_timestamp = now;
        if delta < CYCLE_TIME_THRESHOLD_US {
            self.cycle_time = (self.cycle_time + sample) >> 1;
            true
        } else {
            self.cycle_time = sample;
            false
        }
    }

    /// `cyclemon_checkTimeout`: called from the main loop, independent of
    /// the sync path. Only meaningful in `Active`; transitions to `Timeout`
    /// and returns `true` once `now > last + cycle_time + CYCLE_TIME_TIMEOUT_US`.
    pub fn check_timeout(&mut self, constime: &ConsecutiveTime, counter: &impl HardwareCounter) -> bool {
        if self.state != State::Active {
            return false;
        }
        let comp = self.last_timestamp + self.cycle_time as u64;
        let now = constime.time_base(counter);
        if now > comp + CYCLE_TIME_TIMEOUT_US as u64 {
            self.state = State::Timeout;
            true
        } else {
            false
        }
    }
}

impl Default for CycleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockCounter;

    /// Runs three evenly spaced sync calls: the first seeds the baseline
    /// timestamp, the second produces the raw candidate cycle time, the
    /// third confirms it within `CYCLE_TIME_THRESHOLD_US` and activates
    /// (matching `calculateCycleTime`'s two-successive-samples rule).
    fn prime_active(mon: &mut CycleMonitor, ct: &ConsecutiveTime, counter: &MockCounter, interval_us: u16) {
        for _ in 0..3 {
            counter.advance(interval_us);
            mon.process(ct, counter);
        }
    }

    #[test]
    fn learns_stable_cycle_and_activates() {
        let mut mon = CycleMonitor::new();
        let ct = ConsecutiveTime::new();
        let counter = MockCounter::default();

        counter.advance(1000);
        assert!(mon.process(&ct, &counter));
        assert_eq!(mon.state(), State::Init);

        counter.advance(1000);
        assert!(mon.process(&ct, &counter));
        assert_eq!(mon.state(), State::Init);

        counter.advance(1000);
        assert!(mon.process(&ct, &counter));
        assert_eq!(mon.state(), State::Active);
    }

    #[test]
    fn no_spurious_timeout_within_grace_period() {
        let mut mon = CycleMonitor::new();
        let ct = ConsecutiveTime::new();
        let counter = MockCounter::default();

        prime_active(&mut mon, &ct, &counter, 1000);
        assert_eq!(mon.state(), State::Active);

        // hold timestamp, advance just inside the grace window
        counter.advance(1000 + CYCLE_TIME_TIMEOUT_US);
        assert!(!mon.check_timeout(&ct, &counter));
        assert_eq!(mon.state(), State::Active);
    }

    #[test]
    fn timeout_after_cycle_plus_grace() {
        let mut mon = CycleMonitor::new();
        let ct = ConsecutiveTime::new();
        let counter = MockCounter::default();

        prime_active(&mut mon, &ct, &counter, 1000);
        assert_eq!(mon.state(), State::Active);

        counter.advance(1000 + CYCLE_TIME_TIMEOUT_US + 1);
        assert!(mon.check_timeout(&ct, &counter));
        assert_eq!(mon.state(), State::Timeout);
    }

    #[test]
    fn timeout_state_resets_to_init_on_next_process() {
        let mut mon = CycleMonitor::new();
        let ct = ConsecutiveTime::new();
        let counter = MockCounter::default();

        prime_active(&mut mon, &ct, &counter, 1000);
        counter.advance(1000 + CYCLE_TIME_TIMEOUT_US + 1);
        mon.check_timeout(&ct, &counter);
        assert_eq!(mon.state(), State::Timeout);

        assert!(mon.process(&ct, &counter));
        assert_eq!(mon.state(), State::Init);
    }

    #[test]
    fn cycle_time_out_of_range_stays_in_init() {
        let mut mon = CycleMonitor::new();
        let ct = ConsecutiveTime::new();
        let counter = MockCounter::default();

        // below CYCLE_TIME_MIN_US: learning converges but range check rejects it
        prime_active(&mut mon, &ct, &counter, 100);
        assert_eq!(mon.state(), State::Init);
    }
}
