//! Output stall detection state machine
//!
//! Pure decision logic: the supervisor thread feeds one [`Observation`] per
//! tick and acts on the returned [`Decision`]. Keeping the machine free of
//! timers and threads lets every transition be driven directly in tests.
//!
//! ```text
//! Idle -> Monitoring -> StallDetected -> Rebuilding -> Monitoring
//!                                     \-> Failed (terminal until disarm)
//! ```

use serde::Serialize;

/// Default restart budget before the pipeline is declared failed
pub const DEFAULT_MAX_RESTART_ATTEMPTS: u32 = 3;

/// Default number of consecutive healthy ticks that refill the budget
pub const DEFAULT_HEALTHY_TICKS_TO_RESET: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogPhase {
    Idle,
    Monitoring,
    StallDetected,
    Rebuilding,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub max_restart_attempts: u32,
    /// Consecutive healthy ticks after which `restart_attempts` returns to
    /// zero; 0 disables the reset
    pub healthy_ticks_to_reset: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_restart_attempts: DEFAULT_MAX_RESTART_ATTEMPTS,
            healthy_ticks_to_reset: DEFAULT_HEALTHY_TICKS_TO_RESET,
        }
    }
}

/// What the supervisor saw on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Render callbacks since the last rebuild
    pub callback_count: u64,
    /// Whether the output graph reports itself running
    pub graph_running: bool,
    /// Whether at least one frame has been pushed since start
    pub data_received: bool,
}

/// Action the supervisor must take for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Watchdog not armed
    Idle,
    /// Render is progressing (or nothing is expected yet)
    Healthy,
    /// Tear down and rebuild the output graph; `attempt` is 1-based
    Rebuild { attempt: u32 },
    /// Budget exhausted; no further restarts
    Failed { attempts: u32 },
}

#[derive(Debug)]
pub struct PipelineWatchdog {
    config: WatchdogConfig,
    phase: WatchdogPhase,
    last_observed_callback_count: u64,
    restart_attempts: u32,
    healthy_ticks: u32,
}

impl PipelineWatchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            phase: WatchdogPhase::Idle,
            last_observed_callback_count: 0,
            restart_attempts: 0,
            healthy_ticks: 0,
        }
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.phase
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }

    pub fn max_restart_attempts(&self) -> u32 {
        self.config.max_restart_attempts
    }

    pub fn is_failed(&self) -> bool {
        self.phase == WatchdogPhase::Failed
    }

    /// Start monitoring a freshly started output graph
    pub fn arm(&mut self) {
        self.phase = WatchdogPhase::Monitoring;
        self.last_observed_callback_count = 0;
        self.restart_attempts = 0;
        self.healthy_ticks = 0;
    }

    /// Stop monitoring; clears all state including `Failed`
    pub fn disarm(&mut self) {
        self.phase = WatchdogPhase::Idle;
        self.last_observed_callback_count = 0;
        self.restart_attempts = 0;
        self.healthy_ticks = 0;
    }

    /// Feed one tick's observation
    pub fn observe(&mut self, obs: Observation) -> Decision {
        match self.phase {
            WatchdogPhase::Idle => return Decision::Idle,
            WatchdogPhase::Failed => {
                return Decision::Failed {
                    attempts: self.restart_attempts,
                }
            }
            WatchdogPhase::Monitoring
            | WatchdogPhase::StallDetected
            | WatchdogPhase::Rebuilding => {}
        }

        let progressed = obs.callback_count != self.last_observed_callback_count;
        self.last_observed_callback_count = obs.callback_count;

        let stalled = !obs.graph_running || (!progressed && obs.data_received);
        if !stalled {
            self.phase = WatchdogPhase::Monitoring;
            self.healthy_ticks = self.healthy_ticks.saturating_add(1);
            if self.config.healthy_ticks_to_reset > 0
                && self.restart_attempts > 0
                && self.healthy_ticks >= self.config.healthy_ticks_to_reset
            {
                self.restart_attempts = 0;
            }
            return Decision::Healthy;
        }

        self.phase = WatchdogPhase::StallDetected;
        self.healthy_ticks = 0;

        if self.restart_attempts < self.config.max_restart_attempts {
            self.restart_attempts += 1;
            self.phase = WatchdogPhase::Rebuilding;
            Decision::Rebuild {
                attempt: self.restart_attempts,
            }
        } else {
            self.phase = WatchdogPhase::Failed;
            Decision::Failed {
                attempts: self.restart_attempts,
            }
        }
    }

    /// Output graph rebuilt; callback count was reset to zero
    pub fn rebuild_completed(&mut self) {
        if self.phase == WatchdogPhase::Failed {
            return;
        }
        self.phase = WatchdogPhase::Monitoring;
        self.last_observed_callback_count = 0;
    }
}

impl Default for PipelineWatchdog {
    fn default() -> Self {
        Self::new(WatchdogConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(callback_count: u64, graph_running: bool, data_received: bool) -> Observation {
        Observation {
            callback_count,
            graph_running,
            data_received,
        }
    }

    #[test]
    fn test_idle_until_armed() {
        let mut wd = PipelineWatchdog::default();
        assert_eq!(wd.observe(obs(0, false, true)), Decision::Idle);
        wd.arm();
        assert_eq!(wd.phase(), WatchdogPhase::Monitoring);
    }

    #[test]
    fn test_progress_is_healthy() {
        let mut wd = PipelineWatchdog::default();
        wd.arm();
        assert_eq!(wd.observe(obs(100, true, true)), Decision::Healthy);
        assert_eq!(wd.observe(obs(200, true, true)), Decision::Healthy);
    }

    #[test]
    fn test_no_data_no_progress_is_not_a_stall() {
        let mut wd = PipelineWatchdog::default();
        wd.arm();
        assert_eq!(wd.observe(obs(0, true, false)), Decision::Healthy);
    }

    #[test]
    fn test_dead_graph_is_a_stall_without_data() {
        let mut wd = PipelineWatchdog::default();
        wd.arm();
        assert_eq!(wd.observe(obs(0, false, false)), Decision::Rebuild { attempt: 1 });
        assert_eq!(wd.phase(), WatchdogPhase::Rebuilding);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut wd = PipelineWatchdog::default();
        wd.arm();
        for attempt in 1..=3 {
            assert_eq!(wd.observe(obs(0, true, true)), Decision::Rebuild { attempt });
            wd.rebuild_completed();
        }
        assert_eq!(wd.observe(obs(0, true, true)), Decision::Failed { attempts: 3 });
        assert!(wd.is_failed());

        // Terminal: further ticks and rebuild notifications change nothing
        wd.rebuild_completed();
        assert_eq!(wd.observe(obs(500, true, true)), Decision::Failed { attempts: 3 });
    }

    #[test]
    fn test_healthy_ticks_refill_budget() {
        let mut wd = PipelineWatchdog::new(WatchdogConfig {
            max_restart_attempts: 3,
            healthy_ticks_to_reset: 2,
        });
        wd.arm();
        assert_eq!(wd.observe(obs(0, true, true)), Decision::Rebuild { attempt: 1 });
        wd.rebuild_completed();
        assert_eq!(wd.observe(obs(10, true, true)), Decision::Healthy);
        assert_eq!(wd.restart_attempts(), 1);
        assert_eq!(wd.observe(obs(20, true, true)), Decision::Healthy);
        assert_eq!(wd.restart_attempts(), 0);
    }

    #[test]
    fn test_reset_disabled_with_zero() {
        let mut wd = PipelineWatchdog::new(WatchdogConfig {
            max_restart_attempts: 3,
            healthy_ticks_to_reset: 0,
        });
        wd.arm();
        wd.observe(obs(0, false, true));
        wd.rebuild_completed();
        for i in 1..50 {
            wd.observe(obs(i, true, true));
        }
        assert_eq!(wd.restart_attempts(), 1);
    }

    #[test]
    fn test_disarm_clears_failed() {
        let mut wd = PipelineWatchdog::new(WatchdogConfig {
            max_restart_attempts: 0,
            healthy_ticks_to_reset: 0,
        });
        wd.arm();
        assert_eq!(wd.observe(obs(0, false, true)), Decision::Failed { attempts: 0 });
        wd.disarm();
        assert_eq!(wd.phase(), WatchdogPhase::Idle);
        assert_eq!(wd.restart_attempts(), 0);
    }
}
