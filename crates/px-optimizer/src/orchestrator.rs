//! The search loop: run candidate trials concurrently, select the best by a
//! validation metric, and restore its checkpoint with best-first fallback.

use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use px_model::{
    evaluate, train, InitializerResolver, IrtModelSpec, IrtNetwork, TrainOptions, WeightCheckpoint,
};
use px_types::{ModelConfiguration, PxError, PxResult, SearchError};

use crate::scheduler::SchedulerHandle;
use crate::search::{apply_sample, sample_fingerprint, ConfigSample, SearchStrategy};
use crate::trial::{
    sorted_candidates, Metric, SearchPhase, StopCondition, Trial, TrialMetrics, TrialStatus,
};

/// Settings for one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// How many candidate configurations to draw.
    pub num_trials: usize,

    /// Metric driving selection; direction follows the metric kind.
    pub metric: Metric,

    /// Optional early-termination bounds.
    pub stop: Option<StopCondition>,

    /// Per-trial training settings.
    pub train: TrainOptions,

    /// Directory receiving trial-scoped weight checkpoints.
    pub checkpoint_dir: PathBuf,
}

impl SearchConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            num_trials: 4,
            metric: Metric::MeanError,
            stop: None,
            train: TrainOptions::default(),
            checkpoint_dir: checkpoint_dir.into(),
        }
    }

    pub fn with_num_trials(mut self, n: usize) -> Self {
        self.num_trials = n;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_stop(mut self, stop: StopCondition) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_train(mut self, train: TrainOptions) -> Self {
        self.train = train;
        self
    }
}

/// Result of a successful search: the restored best model plus the full
/// trial record.
#[derive(Debug)]
pub struct SearchOutcome {
    pub model: IrtNetwork,
    /// Number of the trial whose checkpoint was restored.
    pub trial_number: usize,
    pub metrics: TrialMetrics,
    pub trials: Vec<Trial>,
}

/// Drives one hyperparameter search for a declared model spec.
pub struct SearchOrchestrator<'a> {
    scheduler: &'a SchedulerHandle,
    spec: IrtModelSpec,
    base_config: serde_json::Value,
}

impl<'a> SearchOrchestrator<'a> {
    pub fn new(
        scheduler: &'a SchedulerHandle,
        spec: IrtModelSpec,
        base_config: serde_json::Value,
    ) -> Self {
        Self {
            scheduler,
            spec,
            base_config,
        }
    }

    /// Run the full search: draw candidates, train them under the
    /// scheduler's concurrency cap, then select and restore the best.
    ///
    /// Training failures inside a trial are contained (the trial is marked
    /// failed and excluded from selection); restore failures fall through
    /// the candidate chain; an exhausted chain is fatal.
    pub fn run(
        &self,
        strategy: &mut dyn SearchStrategy,
        search: &SearchConfig,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) -> PxResult<SearchOutcome> {
        let mut samples = strategy.suggest(search.num_trials.max(1));
        if samples.is_empty() {
            // An empty space still evaluates the base configuration once.
            samples.push(ConfigSample::new());
        }

        let mut records = Vec::with_capacity(samples.len());
        for (number, sample) in samples.into_iter().enumerate() {
            let config = apply_sample(&self.base_config, &sample)?;
            records.push(Trial::new(number, sample, config));
        }
        let trial_count = records.len();

        info!(
            phase = ?SearchPhase::Running,
            trials = trial_count,
            strategy = strategy.name(),
            workers = self.scheduler.worker_count(trial_count),
            cpus_per_trial = self.scheduler.trial_resources().cpus,
            "starting hyperparameter search"
        );

        let trials = Mutex::new(records);
        let cancel = AtomicBool::new(false);
        let (sender, receiver) = crossbeam_channel::unbounded::<usize>();
        for index in 0..trial_count {
            // The channel is unbounded and open; sending cannot fail here.
            let _ = sender.send(index);
        }
        drop(sender);

        std::thread::scope(|scope| {
            let trials = &trials;
            let cancel = &cancel;
            for _ in 0..self.scheduler.worker_count(trial_count) {
                let receiver = receiver.clone();
                scope.spawn(move || {
                    while let Ok(index) = receiver.recv() {
                        if cancel.load(Ordering::Relaxed) {
                            continue;
                        }
                        self.run_trial(index, trials, cancel, search, x_user, x_questions, y);
                    }
                });
            }
        });

        let trials = trials.into_inner();
        let completed = trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .count();
        info!(phase = ?SearchPhase::Selecting, completed, "selecting best trial");

        let (trial_number, metrics, model) =
            self.restore_best(&trials, search.metric, x_user.ncols(), x_questions.ncols())?;

        Ok(SearchOutcome {
            model,
            trial_number,
            metrics,
            trials,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_trial(
        &self,
        index: usize,
        trials: &Mutex<Vec<Trial>>,
        cancel: &AtomicBool,
        search: &SearchConfig,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) {
        let (sample, config) = {
            let mut guard = trials.lock();
            guard[index].mark_running();
            (guard[index].sample.clone(), guard[index].config.clone())
        };

        match self.execute_trial(index, &sample, &config, search, x_user, x_questions, y, cancel)
        {
            Ok((metrics, checkpoint)) => {
                info!(
                    trial = index,
                    mean_error = metrics.mean_error,
                    mean_accuracy = metrics.mean_accuracy,
                    "trial completed"
                );
                trials.lock()[index].mark_completed(metrics, checkpoint);
                if search.stop.is_some_and(|stop| stop.is_met(&metrics)) {
                    info!(trial = index, "stop condition met, ending search early");
                    cancel.store(true, Ordering::Relaxed);
                }
            }
            Err(err) => {
                let failure = SearchError::TrialFailed {
                    trial: index,
                    message: err.to_string(),
                };
                warn!(trial = index, error = %failure, "trial excluded from selection");
                trials.lock()[index].mark_failed(err.to_string());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_trial(
        &self,
        number: usize,
        sample: &ConfigSample,
        config: &serde_json::Value,
        search: &SearchConfig,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
        cancel: &AtomicBool,
    ) -> PxResult<(TrialMetrics, PathBuf)> {
        let fingerprint = sample_fingerprint(sample);
        let mut model = self.build_model(
            config,
            x_user.ncols(),
            x_questions.ncols(),
            trial_seed(fingerprint, number),
        )?;

        train(&mut model, x_user, x_questions, y, &search.train, Some(cancel))?;
        let eval = evaluate(&model, x_user, x_questions, y);

        // Unique, deterministic checkpoint name: no collisions between
        // concurrent trials, reproducible from the drawn sample.
        let path = search
            .checkpoint_dir
            .join(format!("weights_trial_{number}_{fingerprint:016x}.json"));
        WeightCheckpoint::capture(&model).save(&path)?;

        Ok((
            TrialMetrics {
                mean_error: eval.mean_error,
                mean_accuracy: eval.mean_accuracy,
            },
            path,
        ))
    }

    /// Attempt candidates best-first: rebuild an architecturally identical
    /// model from the trial's configuration and load its persisted weights.
    /// A failed load falls through to the next candidate; an empty chain is
    /// `NoRestorableModel`.
    pub fn restore_best(
        &self,
        trials: &[Trial],
        metric: Metric,
        user_dim: usize,
        item_dim: usize,
    ) -> PxResult<(usize, TrialMetrics, IrtNetwork)> {
        let candidates = sorted_candidates(trials, metric);

        for &index in &candidates {
            let trial = &trials[index];
            let checkpoint = match &trial.checkpoint {
                Some(path) => path,
                None => continue,
            };
            // Configuration errors here mean a corrupted trial record, not
            // a bad checkpoint; they propagate instead of falling through.
            let mut model = self.build_model(
                &trial.config,
                user_dim,
                item_dim,
                trial_seed(sample_fingerprint(&trial.sample), trial.number),
            )?;

            let loaded = WeightCheckpoint::load(checkpoint)
                .and_then(|saved| saved.apply(&mut model).map_err(PxError::from));
            match loaded {
                Ok(()) => {
                    info!(
                        phase = ?SearchPhase::Restored,
                        trial = trial.number,
                        "restored best candidate"
                    );
                    let metrics = trial.metrics.unwrap_or(TrialMetrics {
                        mean_error: f64::NAN,
                        mean_accuracy: f64::NAN,
                    });
                    return Ok((trial.number, metrics, model));
                }
                Err(err) => {
                    let failure = SearchError::RestoreFailed {
                        trial: trial.number,
                        message: err.to_string(),
                    };
                    warn!(error = %failure, "loading failed, trying next candidate");
                }
            }
        }

        info!(phase = ?SearchPhase::Exhausted, attempted = candidates.len(), "no candidate restored");
        Err(SearchError::NoRestorableModel {
            attempted: candidates.len(),
        }
        .into())
    }

    fn build_model(
        &self,
        config: &serde_json::Value,
        user_dim: usize,
        item_dim: usize,
        seed: u64,
    ) -> PxResult<IrtNetwork> {
        let mut typed = ModelConfiguration::from_value(config)?;
        InitializerResolver::new().resolve_configuration(&mut typed)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        Ok(self.spec.create_model(&typed, user_dim, item_dim, &mut rng)?)
    }
}

fn trial_seed(fingerprint: u64, number: usize) -> u64 {
    fingerprint ^ (number as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
