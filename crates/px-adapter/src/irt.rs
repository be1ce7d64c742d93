//! The IRT estimator: merge user params onto the variant preset, search for
//! the best-performing configuration, and expose the restored model through
//! a fit/predict/score surface with selection statistics.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use px_config::merge_defaults;
use px_model::{
    evaluate, variant_preset, DenseLayer, EvalMetrics, InitializerResolver, IrtModelSpec,
    IrtNetwork, TrainOptions, WeightCheckpoint, LAYER_ABILITY, LAYER_DIFFICULTY,
    LAYER_DISCRIMINATION, LAYER_GUESS, LAYER_SLIP,
};
use px_optimizer::{
    GridSearch, Metric, RandomSearch, SchedulerConfig, SchedulerHandle, SearchConfig,
    SearchOrchestrator, SearchSpace, SearchStrategy, StopCondition, Trial,
};
use px_types::{sigmoid, AdapterError, IrtVariant, ModelConfiguration, PxResult};

const ESTIMATOR_FILE: &str = "estimator.json";
const WEIGHTS_FILE: &str = "weights.json";
const EXCHANGE_FILE: &str = "architecture.json";

/// Fit-time settings. `params` overlays the variant preset leaf-by-leaf;
/// `space` (when present) spans the hyperparameter search.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,

    /// Latent-trait dimensionality; when set, every parameter group is
    /// widened to this many units (the fixed head averages them back to a
    /// scalar probability).
    pub latent_traits: Option<usize>,

    /// Partial configuration overrides, merged onto the variant preset.
    pub params: Option<serde_json::Value>,

    pub num_trials: usize,
    pub metric: Metric,
    pub stop: Option<StopCondition>,
    pub space: Option<SearchSpace>,

    /// Where trial checkpoints land; a temporary directory when unset.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 64,
            batch_size: 16,
            validation_split: 0.2,
            latent_traits: None,
            params: None,
            num_trials: 4,
            metric: Metric::MeanError,
            stop: None,
            space: None,
            checkpoint_dir: None,
        }
    }
}

/// Model-selection statistics of one fitted estimator.
///
/// The log-likelihood is taken from the evaluated loss on the full fitting
/// data. AICc carries a small-sample correction, so fitting fails with
/// `DegenerateSampleSize` when the sample is not larger than the
/// trainable-parameter count plus one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    pub samples: usize,
    pub trainable_parameters: usize,
    pub log_likelihood: f64,
    pub aic: f64,
    pub aicc: f64,
}

/// `AIC + (2k^2 + 2k) / (n - k - 1)`, undefined when the denominator is
/// not positive.
fn corrected_aic(samples: usize, trainables: usize, aic: f64) -> Result<f64, AdapterError> {
    let n = samples as i64;
    let k = trainables as i64;
    if n - k - 1 <= 0 {
        return Err(AdapterError::DegenerateSampleSize {
            samples,
            trainables,
        });
    }
    Ok(aic + (2 * k * k + 2 * k) as f64 / (n - k - 1) as f64)
}

/// Everything frozen by a successful fit.
struct FittedModel {
    network: IrtNetwork,
    variant: IrtVariant,
    statistics: FitStatistics,
    trials: Vec<Trial>,
}

/// Persisted estimator state (weights live in a separate checkpoint file).
#[derive(Debug, Serialize, Deserialize)]
struct EstimatorState {
    declared: IrtVariant,
    variant: IrtVariant,
    user_dim: usize,
    item_dim: usize,
    config: serde_json::Value,
    statistics: FitStatistics,
}

/// Portable architecture summary, one entry per graph layer.
#[derive(Debug, Serialize, Deserialize)]
struct LayerDescriptor {
    name: String,
    class_name: String,
    input_dim: usize,
    units: usize,
    activation: px_types::Activation,
    use_bias: bool,
    trainable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchitectureDescription {
    variant: IrtVariant,
    layers: Vec<LayerDescriptor>,
}

/// An IRT proxy estimator for one declared model family member.
pub struct IrtRegressor {
    declared: IrtVariant,
    options: FitOptions,
    fitted: Option<FittedModel>,
}

impl IrtRegressor {
    pub fn new(declared: IrtVariant) -> Self {
        Self {
            declared,
            options: FitOptions::default(),
            fitted: None,
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn declared(&self) -> IrtVariant {
        self.declared
    }

    /// The classified variant after fit (a trainable slip group promotes a
    /// declared three-parameter model to four).
    pub fn variant(&self) -> Result<IrtVariant, AdapterError> {
        Ok(self.fitted()?.variant)
    }

    pub fn statistics(&self) -> Result<&FitStatistics, AdapterError> {
        Ok(&self.fitted()?.statistics)
    }

    /// Trial records of the last search, best and worst alike.
    pub fn trials(&self) -> Result<&[Trial], AdapterError> {
        Ok(&self.fitted()?.trials)
    }

    /// Fit on one-hot user/question inputs against observed responses.
    ///
    /// Runs the configuration search under the process scheduler and keeps
    /// the restored best model.
    pub fn fit(
        &mut self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) -> PxResult<&FitStatistics> {
        let overrides = match &self.options.params {
            Some(value) if !value.is_object() => {
                return Err(AdapterError::InvalidParamsType {
                    found: json_type_name(value).to_string(),
                }
                .into());
            }
            Some(value) => value.clone(),
            None => serde_json::json!({}),
        };

        let base = variant_preset(self.declared);
        let mut merged = merge_defaults(&overrides, &base);
        if let Some(traits) = self.options.latent_traits {
            for key in px_types::GROUP_KEYS {
                px_config::set_dotted(&mut merged, &format!("{key}.units"), traits.into())?;
            }
        }
        let typed = ModelConfiguration::from_value(&merged)?;
        let variant = IrtVariant::classify(self.declared, &typed);
        if variant != self.declared {
            info!(
                declared = self.declared.label(),
                classified = variant.label(),
                "slip group is trainable, reporting on the richer scale"
            );
        }

        let scheduler = SchedulerHandle::global(SchedulerConfig::default());

        let mut temp_guard = None;
        let checkpoint_dir = match &self.options.checkpoint_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => {
                let dir = tempfile::tempdir()?;
                let path = dir.path().to_path_buf();
                temp_guard = Some(dir);
                path
            }
        };

        let train = TrainOptions {
            epochs: self.options.epochs,
            batch_size: self.options.batch_size,
            validation_split: self.options.validation_split,
        };
        let mut search = SearchConfig::new(checkpoint_dir)
            .with_num_trials(self.options.num_trials)
            .with_metric(self.options.metric)
            .with_train(train);
        if let Some(stop) = self.options.stop {
            search = search.with_stop(stop);
        }

        let mut strategy: Box<dyn SearchStrategy> = match &self.options.space {
            Some(space) if space.grid_size().is_some() => {
                Box::new(GridSearch::new(space.clone(), 4))
            }
            Some(space) => Box::new(RandomSearch::new(space.clone())),
            // No space: one trial of the merged configuration itself.
            None => Box::new(GridSearch::new(SearchSpace::new(), 2)),
        };

        let orchestrator = SearchOrchestrator::new(&scheduler, IrtModelSpec::new(variant), merged);
        let outcome = orchestrator.run(strategy.as_mut(), &search, x_user, x_questions, y)?;
        drop(temp_guard);

        let eval = evaluate(&outcome.model, x_user, x_questions, y);
        let samples = y.len();
        let trainable_parameters = outcome.model.trainable_parameter_count();
        let log_likelihood = -(samples as f64) * eval.loss;
        let aic = 2.0 * trainable_parameters as f64 - 2.0 * log_likelihood;
        let aicc = corrected_aic(samples, trainable_parameters, aic)?;

        info!(
            variant = variant.label(),
            best_trial = outcome.trial_number,
            trials = outcome.trials.len(),
            aic,
            "fit complete"
        );

        let fitted = self.fitted.insert(FittedModel {
            network: outcome.model,
            variant,
            statistics: FitStatistics {
                samples,
                trainable_parameters,
                log_likelihood,
                aic,
                aicc,
            },
            trials: outcome.trials,
        });
        Ok(&fitted.statistics)
    }

    /// Response probabilities, one per row.
    pub fn predict(
        &self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
    ) -> PxResult<Array1<f64>> {
        let fitted = self.fitted()?;
        check_input_shapes(&fitted.network, x_user, x_questions)?;
        Ok(fitted.network.predict(x_user, x_questions))
    }

    /// Loss, mean error and accuracy against observed responses.
    pub fn score(
        &self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
        y: &Array1<f64>,
    ) -> PxResult<EvalMetrics> {
        let fitted = self.fitted()?;
        check_input_shapes(&fitted.network, x_user, x_questions)?;
        if y.len() != x_user.nrows() {
            return Err(AdapterError::ShapeMismatch {
                expected: format!("{} targets", x_user.nrows()),
                actual: format!("{} targets", y.len()),
            }
            .into());
        }
        Ok(evaluate(&fitted.network, x_user, x_questions, y))
    }

    /// Per-entity parameter estimates on interpretable scales, keyed by
    /// layer name: raw ability/difficulty weights, exponentiated
    /// discrimination, and guess/slip through the logistic inverse-link for
    /// the variants that train them.
    ///
    /// Values are effective parameters: a layer's bias is added to each
    /// kernel weight before the transform, so a guess entry is the model's
    /// actual guessing probability for that item, not the raw kernel
    /// weight.
    pub fn coefficients(&self) -> Result<BTreeMap<String, Vec<f64>>, AdapterError> {
        let fitted = self.fitted()?;
        let network = &fitted.network;
        let variant = fitted.variant;

        let mut out = BTreeMap::new();
        out.insert(LAYER_ABILITY.to_string(), layer_values(&network.ability, raw));
        out.insert(
            LAYER_DIFFICULTY.to_string(),
            layer_values(&network.difficulty, raw),
        );
        out.insert(
            LAYER_DISCRIMINATION.to_string(),
            layer_values(&network.discrimination, f64::exp),
        );
        out.insert(
            LAYER_GUESS.to_string(),
            layer_values(
                &network.guess,
                if variant.guess_on_probability_scale() {
                    sigmoid
                } else {
                    raw
                },
            ),
        );
        out.insert(
            LAYER_SLIP.to_string(),
            layer_values(
                &network.slip,
                if variant.slip_on_probability_scale() {
                    sigmoid
                } else {
                    raw
                },
            ),
        );
        Ok(out)
    }

    /// Persist the fitted estimator into `dir` as three artifacts: the
    /// estimator state, the weight checkpoint, and a portable architecture
    /// summary.
    pub fn save(&self, dir: &Path) -> PxResult<()> {
        let fitted = self.fitted()?;
        fs::create_dir_all(dir)?;

        let state = EstimatorState {
            declared: self.declared,
            variant: fitted.variant,
            user_dim: fitted.network.user_dim,
            item_dim: fitted.network.item_dim,
            config: fitted.network.config.to_value()?,
            statistics: fitted.statistics,
        };
        fs::write(
            dir.join(ESTIMATOR_FILE),
            serde_json::to_vec_pretty(&state)?,
        )?;

        WeightCheckpoint::capture(&fitted.network).save(&dir.join(WEIGHTS_FILE))?;

        let description = ArchitectureDescription {
            variant: fitted.variant,
            layers: fitted
                .network
                .layers()
                .into_iter()
                .map(describe_layer)
                .collect(),
        };
        fs::write(
            dir.join(EXCHANGE_FILE),
            serde_json::to_vec_pretty(&description)?,
        )?;
        Ok(())
    }

    /// Rebuild a fitted estimator from a `save` directory.
    pub fn load(dir: &Path) -> PxResult<Self> {
        let raw = fs::read(dir.join(ESTIMATOR_FILE))?;
        let state: EstimatorState = serde_json::from_slice(&raw)?;

        let mut config = ModelConfiguration::from_value(&state.config)?;
        InitializerResolver::new().resolve_configuration(&mut config)?;

        let spec = IrtModelSpec::new(state.declared);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut network = spec.create_model(&config, state.user_dim, state.item_dim, &mut rng)?;
        WeightCheckpoint::load(&dir.join(WEIGHTS_FILE))?.apply(&mut network)?;

        Ok(Self {
            declared: state.declared,
            options: FitOptions::default(),
            fitted: Some(FittedModel {
                network,
                variant: state.variant,
                statistics: state.statistics,
                trials: Vec::new(),
            }),
        })
    }

    fn fitted(&self) -> Result<&FittedModel, AdapterError> {
        self.fitted.as_ref().ok_or(AdapterError::NotFitted)
    }
}

fn check_input_shapes(
    network: &IrtNetwork,
    x_user: &Array2<f64>,
    x_questions: &Array2<f64>,
) -> Result<(), AdapterError> {
    if x_user.ncols() != network.user_dim || x_questions.ncols() != network.item_dim {
        return Err(AdapterError::ShapeMismatch {
            expected: format!(
                "user width {}, question width {}",
                network.user_dim, network.item_dim
            ),
            actual: format!(
                "user width {}, question width {}",
                x_user.ncols(),
                x_questions.ncols()
            ),
        });
    }
    if x_user.nrows() != x_questions.nrows() {
        return Err(AdapterError::ShapeMismatch {
            expected: format!("{} question rows", x_user.nrows()),
            actual: format!("{} question rows", x_questions.nrows()),
        });
    }
    Ok(())
}

/// Per-input parameter values of a one-unit layer: the kernel column
/// shifted by the (scalar) bias, passed through the reporting transform.
fn layer_values(layer: &DenseLayer, transform: fn(f64) -> f64) -> Vec<f64> {
    let shift = layer.bias.as_ref().map_or(0.0, |bias| bias[0]);
    layer
        .weights
        .column(0)
        .iter()
        .map(|&w| transform(w + shift))
        .collect()
}

fn raw(x: f64) -> f64 {
    x
}

fn describe_layer(layer: &DenseLayer) -> LayerDescriptor {
    LayerDescriptor {
        name: layer.name.clone(),
        class_name: "Dense".to_string(),
        input_dim: layer.in_dim(),
        units: layer.units(),
        activation: layer.activation,
        use_bias: layer.bias.is_some(),
        trainable: layer.trainable,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "mapping",
    }
}
