//! Trial lifecycle records and deterministic best-first ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::search::ConfigSample;

/// Lifecycle of one whole search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    Pending,
    Running,
    Selecting,
    Restored,
    Exhausted,
}

/// Which validation metric drives selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MeanError,
    MeanAccuracy,
}

impl Metric {
    /// Error-type metrics select ascending (lower is better),
    /// accuracy-type descending.
    pub fn direction(&self) -> MetricDirection {
        match self {
            Self::MeanError => MetricDirection::Ascending,
            Self::MeanAccuracy => MetricDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricDirection {
    Ascending,
    Descending,
}

/// Validation metrics reported by one trained trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialMetrics {
    pub mean_error: f64,
    pub mean_accuracy: f64,
}

impl TrialMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::MeanError => self.mean_error,
            Metric::MeanAccuracy => self.mean_accuracy,
        }
    }
}

/// Early-termination bounds: the search stops drawing work once any
/// completed trial crosses one of these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StopCondition {
    /// Stop when mean error drops to this or below.
    pub max_error: Option<f64>,
    /// Stop when mean accuracy reaches this or above.
    pub min_accuracy: Option<f64>,
}

impl StopCondition {
    pub fn is_met(&self, metrics: &TrialMetrics) -> bool {
        self.max_error.is_some_and(|bound| metrics.mean_error <= bound)
            || self
                .min_accuracy
                .is_some_and(|bound| metrics.mean_accuracy >= bound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One hyperparameter-search candidate: its drawn sample, the full merged
/// configuration, and the training outcome. Mutated only by the training
/// step; frozen once the search loop ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub number: usize,
    /// The overrides drawn from the search space.
    pub sample: ConfigSample,
    /// The full configuration after merging the sample onto the base.
    pub config: serde_json::Value,
    pub status: TrialStatus,
    pub metrics: Option<TrialMetrics>,
    /// Trial-scoped persisted weights, unique per trial.
    pub checkpoint: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(number: usize, sample: ConfigSample, config: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            sample,
            config,
            status: TrialStatus::Pending,
            metrics: None,
            checkpoint: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, metrics: TrialMetrics, checkpoint: PathBuf) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.metrics = Some(metrics);
        self.checkpoint = Some(checkpoint);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Indices of completed trials ordered best-first by `metric`, ties broken
/// by trial number. Failed and unfinished trials are excluded.
pub fn sorted_candidates(trials: &[Trial], metric: Metric) -> Vec<usize> {
    let mut candidates: Vec<(usize, f64)> = trials
        .iter()
        .enumerate()
        .filter(|(_, trial)| trial.status == TrialStatus::Completed)
        .filter_map(|(index, trial)| trial.metrics.map(|m| (index, m.get(metric))))
        .collect();

    candidates.sort_by(|&(a, va), &(b, vb)| {
        let ordering = match metric.direction() {
            MetricDirection::Ascending => va.partial_cmp(&vb),
            MetricDirection::Descending => vb.partial_cmp(&va),
        }
        .unwrap_or(std::cmp::Ordering::Equal);
        ordering.then(trials[a].number.cmp(&trials[b].number))
    });

    candidates.into_iter().map(|(index, _)| index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ConfigSample;
    use serde_json::json;

    fn completed(number: usize, mean_error: f64, mean_accuracy: f64) -> Trial {
        let mut trial = Trial::new(number, ConfigSample::new(), json!({}));
        trial.mark_running();
        trial.mark_completed(
            TrialMetrics {
                mean_error,
                mean_accuracy,
            },
            PathBuf::from(format!("weights_trial_{number}.json")),
        );
        trial
    }

    #[test]
    fn trial_lifecycle() {
        let mut trial = Trial::new(0, ConfigSample::new(), json!({}));
        assert_eq!(trial.status, TrialStatus::Pending);

        trial.mark_running();
        assert_eq!(trial.status, TrialStatus::Running);
        assert!(trial.started_at.is_some());

        trial.mark_completed(
            TrialMetrics {
                mean_error: 0.2,
                mean_accuracy: 0.8,
            },
            PathBuf::from("weights.json"),
        );
        assert_eq!(trial.status, TrialStatus::Completed);
        assert!(trial.finished_at.is_some());
        assert_eq!(trial.metrics.unwrap().mean_error, 0.2);
    }

    #[test]
    fn trial_failure_is_recorded() {
        let mut trial = Trial::new(3, ConfigSample::new(), json!({}));
        trial.mark_running();
        trial.mark_failed("training diverged".into());
        assert_eq!(trial.status, TrialStatus::Failed);
        assert_eq!(trial.error.as_deref(), Some("training diverged"));
    }

    #[test]
    fn error_metric_selects_ascending() {
        let trials = vec![
            completed(0, 0.9, 0.1),
            completed(1, 0.5, 0.2),
            completed(2, 0.7, 0.3),
        ];
        assert_eq!(sorted_candidates(&trials, Metric::MeanError), vec![1, 2, 0]);
    }

    #[test]
    fn accuracy_metric_selects_descending() {
        let trials = vec![
            completed(0, 0.9, 0.1),
            completed(1, 0.5, 0.2),
            completed(2, 0.7, 0.3),
        ];
        assert_eq!(
            sorted_candidates(&trials, Metric::MeanAccuracy),
            vec![2, 1, 0]
        );
    }

    #[test]
    fn ties_break_by_trial_number() {
        let trials = vec![
            completed(1, 0.5, 0.5),
            completed(0, 0.5, 0.5),
            completed(2, 0.5, 0.5),
        ];
        // same metric everywhere: order by trial number
        assert_eq!(sorted_candidates(&trials, Metric::MeanError), vec![1, 0, 2]);
    }

    #[test]
    fn failed_trials_are_excluded() {
        let mut failed = Trial::new(0, ConfigSample::new(), json!({}));
        failed.mark_running();
        failed.mark_failed("panic".into());
        let trials = vec![failed, completed(1, 0.4, 0.6)];
        assert_eq!(sorted_candidates(&trials, Metric::MeanError), vec![1]);
    }

    #[test]
    fn stop_condition_bounds() {
        let stop = StopCondition {
            max_error: Some(0.15),
            min_accuracy: Some(0.95),
        };
        let good_error = TrialMetrics {
            mean_error: 0.1,
            mean_accuracy: 0.5,
        };
        let good_accuracy = TrialMetrics {
            mean_error: 0.4,
            mean_accuracy: 0.97,
        };
        let neither = TrialMetrics {
            mean_error: 0.4,
            mean_accuracy: 0.5,
        };
        assert!(stop.is_met(&good_error));
        assert!(stop.is_met(&good_accuracy));
        assert!(!stop.is_met(&neither));
        assert!(!StopCondition::default().is_met(&good_error));
    }
}
