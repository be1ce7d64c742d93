//! # px-optimizer
//!
//! Hyperparameter search over proxy-model configuration space: search-space
//! definitions and sampling strategies, trial lifecycle records, a bounded
//! concurrent trial runner, and best-candidate selection with a
//! restore-fallback chain.

mod orchestrator;
mod scheduler;
mod search;
mod trial;

pub use orchestrator::{SearchConfig, SearchOrchestrator, SearchOutcome};
pub use scheduler::{SchedulerConfig, SchedulerHandle, TrialResources};
pub use search::{
    apply_sample, sample_fingerprint, ConfigSample, GridSearch, ParameterDef, ParameterKind,
    RandomSearch, SearchSpace, SearchStrategy,
};
pub use trial::{
    sorted_candidates, Metric, MetricDirection, SearchPhase, StopCondition, Trial, TrialMetrics,
    TrialStatus,
};
