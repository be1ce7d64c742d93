//! Process-wide scheduling context for trial execution.
//!
//! The scheduler owns the concurrency cap and the per-trial resource quota.
//! It is acquired once at process start and passed by reference into the
//! orchestrator; repeated initialization is a no-op that returns the
//! existing handle.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Resource quota reserved by one trial. The quota is declared here and
/// enforced by the scheduler, not by trial code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResources {
    /// Compute units per trial (fractional ok).
    pub cpus: f64,
}

impl Default for TrialResources {
    fn default() -> Self {
        Self { cpus: 1.0 }
    }
}

/// Configuration for the scheduling context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How many trials may run at once.
    pub max_concurrent_trials: usize,

    /// Per-trial resource reservation.
    pub trial_resources: TrialResources,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_trials: 4,
            trial_resources: TrialResources::default(),
        }
    }
}

static GLOBAL_SCHEDULER: OnceLock<SchedulerHandle> = OnceLock::new();

/// Shared handle onto the scheduling context.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    config: Arc<SchedulerConfig>,
}

impl SchedulerHandle {
    /// A standalone handle, not registered process-wide. Useful for tests
    /// and embedded callers that manage their own lifetime.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Initialize (or fetch) the process-wide scheduler.
    ///
    /// The first call installs `config`; later calls ignore their argument
    /// and return the already-installed handle.
    pub fn global(config: SchedulerConfig) -> SchedulerHandle {
        GLOBAL_SCHEDULER
            .get_or_init(|| SchedulerHandle::new(config))
            .clone()
    }

    /// The installed process-wide handle, if any.
    pub fn installed() -> Option<SchedulerHandle> {
        GLOBAL_SCHEDULER.get().cloned()
    }

    pub fn max_concurrent_trials(&self) -> usize {
        self.config.max_concurrent_trials.max(1)
    }

    pub fn trial_resources(&self) -> TrialResources {
        self.config.trial_resources
    }

    /// Worker count for a batch of `trial_count` trials: capped at the
    /// concurrency limit and at the batch size.
    pub fn worker_count(&self, trial_count: usize) -> usize {
        self.max_concurrent_trials().min(trial_count.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinitialization_is_a_noop() {
        let first = SchedulerHandle::global(SchedulerConfig {
            max_concurrent_trials: 2,
            trial_resources: TrialResources { cpus: 2.0 },
        });
        let second = SchedulerHandle::global(SchedulerConfig {
            max_concurrent_trials: 16,
            trial_resources: TrialResources { cpus: 0.5 },
        });
        assert_eq!(
            first.max_concurrent_trials(),
            second.max_concurrent_trials()
        );
        assert_eq!(first.trial_resources(), second.trial_resources());
        assert!(SchedulerHandle::installed().is_some());
    }

    #[test]
    fn worker_count_caps_at_batch_size() {
        let handle = SchedulerHandle::new(SchedulerConfig {
            max_concurrent_trials: 8,
            trial_resources: TrialResources::default(),
        });
        assert_eq!(handle.worker_count(3), 3);
        assert_eq!(handle.worker_count(100), 8);
        assert_eq!(handle.worker_count(0), 1);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let handle = SchedulerHandle::new(SchedulerConfig {
            max_concurrent_trials: 0,
            trial_resources: TrialResources::default(),
        });
        assert_eq!(handle.max_concurrent_trials(), 1);
    }
}
