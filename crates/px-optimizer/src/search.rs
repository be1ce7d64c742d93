//! Search space over configuration override paths and sampling strategies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use px_types::ConfigError;

/// One drawn candidate: dotted configuration path -> override value.
/// Ordered so fingerprinting and checkpoint naming are deterministic.
pub type ConfigSample = BTreeMap<String, Value>;

/// A single dimension of the search space, addressing one configuration
/// leaf (e.g. `disc_params.kernel_params.stddev`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Dotted path into the model configuration tree.
    pub path: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<Value> },
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, path: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            path: path.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, path: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            path: path.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, path: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            path: path.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.parameters.push(ParameterDef {
            path: path.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    /// Total number of grid points (`None` if any dimension is continuous
    /// without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::IntRange { low, high } => (high - low + 1) as usize,
                ParameterKind::Choice { values } => values.len(),
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }
}

/// Overlay a drawn sample onto the base configuration tree.
pub fn apply_sample(base: &Value, sample: &ConfigSample) -> Result<Value, ConfigError> {
    let mut merged = base.clone();
    for (path, value) in sample {
        px_config::set_dotted(&mut merged, path, value.clone())?;
    }
    Ok(merged)
}

/// Stable fingerprint of a drawn sample, used for checkpoint naming.
pub fn sample_fingerprint(sample: &ConfigSample) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (path, value) in sample {
        path.hash(&mut hasher);
        value.to_string().hash(&mut hasher);
    }
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Generate the next batch of override samples to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<ConfigSample>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// Exhaustive grid search over discrete parameter combinations.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    combos: Vec<ConfigSample>,
}

impl GridSearch {
    pub fn new(space: SearchSpace, float_steps: usize) -> Self {
        let combos = Self::build_grid(&space, float_steps);
        Self { cursor: 0, combos }
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Vec<ConfigSample> {
        let mut axes: Vec<Vec<(&str, Value)>> = Vec::new();

        for param in &space.parameters {
            let values: Vec<Value> = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    let steps = float_steps.max(2);
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            json_f64(low + t * (high - low))
                        })
                        .collect()
                }
                ParameterKind::IntRange { low, high } => {
                    (*low..=*high).map(Value::from).collect()
                }
                ParameterKind::LogUniform { low, high } => {
                    let steps = float_steps.max(2);
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            json_f64((log_low + t * (log_high - log_low)).exp())
                        })
                        .collect()
                }
                ParameterKind::Choice { values } => values.clone(),
            };
            axes.push(
                values
                    .into_iter()
                    .map(|v| (param.path.as_str(), v))
                    .collect(),
            );
        }

        // Cartesian product
        let mut result: Vec<ConfigSample> = vec![ConfigSample::new()];
        for axis in &axes {
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for (path, value) in axis {
                    let mut combo = existing.clone();
                    combo.insert(path.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<ConfigSample> {
        let end = (self.cursor + count).min(self.combos.len());
        let batch = self.combos[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }

    fn sample_one(&self) -> ConfigSample {
        let mut rng = rand::thread_rng();
        let mut sample = ConfigSample::new();

        for param in &self.space.parameters {
            let value = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    json_f64(rng.gen_range(*low..=*high))
                }
                ParameterKind::IntRange { low, high } => {
                    Value::from(rng.gen_range(*low..=*high))
                }
                ParameterKind::LogUniform { low, high } => {
                    let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
                    json_f64(log_val.exp())
                }
                ParameterKind::Choice { values } => {
                    values[rng.gen_range(0..values.len())].clone()
                }
            };
            sample.insert(param.path.clone(), value);
        }

        sample
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ConfigSample> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_float("hyper_params.learning_rate", 0.01, 0.5)
            .add_int("hyper_params.units", 1, 1)
            .add_choice(
                "disc_params.kernel_params.distrib",
                vec![json!("normal"), json!("uniform")],
            )
    }

    #[test]
    fn grid_search_produces_correct_count() {
        let space = SearchSpace::new()
            .add_int("a", 1, 3) // 3 values
            .add_choice("b", vec![json!(true), json!(false)]); // 2 values
        assert_eq!(space.grid_size(), Some(6));

        let mut gs = GridSearch::new(space, 5);
        let batch = gs.suggest(100);
        assert_eq!(batch.len(), 6);
    }

    #[test]
    fn grid_search_cursor_advances() {
        let space = SearchSpace::new().add_int("x", 1, 5); // 5 values
        let mut gs = GridSearch::new(space, 5);
        assert_eq!(gs.suggest(3).len(), 3);
        assert_eq!(gs.suggest(10).len(), 2); // only 2 remain
    }

    #[test]
    fn random_search_respects_bounds() {
        let mut rs = RandomSearch::new(sample_space());
        for sample in rs.suggest(40) {
            let lr = sample["hyper_params.learning_rate"].as_f64().unwrap();
            assert!((0.01..=0.5).contains(&lr));
            let distrib = sample["disc_params.kernel_params.distrib"].as_str().unwrap();
            assert!(["normal", "uniform"].contains(&distrib));
        }
    }

    #[test]
    fn grid_size_none_for_float_only() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        assert_eq!(space.grid_size(), None);
    }

    #[test]
    fn apply_sample_overrides_base_leaves() {
        let base = json!({
            "disc_params": { "train": true, "kernel_params": { "stddev": 1.0 } }
        });
        let mut sample = ConfigSample::new();
        sample.insert("disc_params.kernel_params.stddev".into(), json!(0.25));
        let merged = apply_sample(&base, &sample).unwrap();
        assert_eq!(
            merged,
            json!({
                "disc_params": { "train": true, "kernel_params": { "stddev": 0.25 } }
            })
        );
    }

    #[test]
    fn fingerprint_is_stable_and_distinguishes_samples() {
        let mut a = ConfigSample::new();
        a.insert("x".into(), json!(1));
        let mut b = ConfigSample::new();
        b.insert("x".into(), json!(2));

        assert_eq!(sample_fingerprint(&a), sample_fingerprint(&a));
        assert_ne!(sample_fingerprint(&a), sample_fingerprint(&b));
    }

    #[test]
    fn log_uniform_stays_in_bounds() {
        let space = SearchSpace::new().add_log_uniform("lr", 1e-5, 1e-1);
        let mut rs = RandomSearch::new(space);
        for sample in rs.suggest(100) {
            let v = sample["lr"].as_f64().unwrap();
            assert!((1e-5..=1e-1).contains(&v), "lr out of bounds: {v}");
        }
    }
}
