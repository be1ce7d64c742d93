//! # px-adapter
//!
//! The estimator facade: a fit/predict/score regressor over the IRT proxy
//! graph, model-selection statistics (AIC/AICc), coefficient reporting on
//! interpretable scales, persistence, and transfer from arbitrary primal
//! estimators.

mod generic;
mod irt;
mod registry;

pub use generic::{PrimalModel, ProxyClassifier, ProxyRegressor};
pub use irt::{FitOptions, FitStatistics, IrtRegressor};
pub use registry::AdapterRegistry;
