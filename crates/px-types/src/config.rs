//! Typed model configuration: parameter groups and training hyperparameters.
//!
//! The merge layer works on `serde_json::Value` trees so user overrides can
//! address any depth by path; once merged, a tree is deserialized into these
//! structs and validated. Unrecognized keys are ignored (lenient policy) so
//! forward-compatible extensions never break older callers.

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, PxResult};
use crate::initializer::{Activation, Initializer, KernelParams};

/// l1/l2 penalty applied to a group's kernel during training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Regularization {
    #[serde(default)]
    pub l1: f64,
    #[serde(default)]
    pub l2: f64,
}

fn default_units() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// One named region of the proxy graph: a single dense projection with its
/// trainability, activation, initialization and regularization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    #[serde(default = "default_units")]
    pub units: usize,

    #[serde(default)]
    pub use_bias: bool,

    #[serde(default = "default_true", rename = "train")]
    pub trainable: bool,

    #[serde(default, rename = "act")]
    pub activation: Activation,

    /// Constant bias initializer value, used when `use_bias` is set.
    #[serde(default, rename = "bias_param")]
    pub bias_value: f64,

    #[serde(default)]
    pub kernel_params: KernelParams,

    #[serde(default, rename = "regularizers")]
    pub regularization: Regularization,

    /// Resolved kernel initializer, cached here by the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_init: Option<Initializer>,

    /// Resolved constant bias initializer, present when `use_bias` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_init: Option<f64>,
}

impl Default for ParameterGroup {
    fn default() -> Self {
        Self {
            units: 1,
            use_bias: false,
            trainable: true,
            activation: Activation::Identity,
            bias_value: 0.0,
            kernel_params: KernelParams::default(),
            regularization: Regularization::default(),
            kernel_init: None,
            bias_init: None,
        }
    }
}

/// Which loss the trainer minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    #[default]
    BinaryCrossentropy,
    MeanSquaredError,
}

fn default_optimizer() -> String {
    "sgd".to_string()
}

fn default_learning_rate() -> f64 {
    0.05
}

/// Training-level settings shared by all groups of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    #[serde(default = "default_units")]
    pub units: usize,

    #[serde(default = "default_optimizer")]
    pub optimizer: String,

    #[serde(default)]
    pub loss: LossKind,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            units: 1,
            optimizer: default_optimizer(),
            loss: LossKind::default(),
            learning_rate: default_learning_rate(),
        }
    }
}

/// External (wire) key names of the parameter groups, in graph order.
pub const GROUP_KEYS: [&str; 5] = [
    "ability_params",
    "diff_params",
    "disc_params",
    "guess_params",
    "slip_params",
];

/// One full proxy-model definition: every parameter group plus the training
/// hyperparameters. The wire representation keys groups by the names in
/// [`GROUP_KEYS`] and the hyperparameter block by `hyper_params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelConfiguration {
    #[serde(rename = "ability_params", default)]
    pub ability: ParameterGroup,

    #[serde(rename = "diff_params", default)]
    pub difficulty: ParameterGroup,

    #[serde(rename = "disc_params", default)]
    pub discrimination: ParameterGroup,

    #[serde(rename = "guess_params", default)]
    pub guess: ParameterGroup,

    #[serde(rename = "slip_params", default)]
    pub slip: ParameterGroup,

    #[serde(rename = "hyper_params", default)]
    pub hyper: HyperParams,
}

impl ModelConfiguration {
    /// Deserialize a merged configuration tree. Unknown keys are ignored.
    pub fn from_value(value: &serde_json::Value) -> PxResult<Self> {
        if !value.is_object() {
            return Err(ConfigError::InvalidConfig {
                message: format!("expected a mapping, got {}", json_type_name(value)),
            }
            .into());
        }
        let config: Self = serde_json::from_value(value.clone())?;
        Ok(config)
    }

    pub fn to_value(&self) -> PxResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Groups keyed by their wire names, in graph order.
    pub fn groups(&self) -> impl Iterator<Item = (&'static str, &ParameterGroup)> {
        [
            (GROUP_KEYS[0], &self.ability),
            (GROUP_KEYS[1], &self.difficulty),
            (GROUP_KEYS[2], &self.discrimination),
            (GROUP_KEYS[3], &self.guess),
            (GROUP_KEYS[4], &self.slip),
        ]
        .into_iter()
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut ParameterGroup)> {
        [
            (GROUP_KEYS[0], &mut self.ability),
            (GROUP_KEYS[1], &mut self.difficulty),
            (GROUP_KEYS[2], &mut self.discrimination),
            (GROUP_KEYS[3], &mut self.guess),
            (GROUP_KEYS[4], &mut self.slip),
        ]
        .into_iter()
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "mapping",
    }
}
