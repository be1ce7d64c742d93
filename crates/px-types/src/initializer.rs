//! Activations and weight-initialization distributions.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Element-wise activation applied to a parameter group's projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Sigmoid,
    Exponential,
}

impl Activation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::Identity => x,
            Self::Sigmoid => sigmoid(x),
            Self::Exponential => x.exp(),
        }
    }

    /// Derivative of the activation expressed in terms of its output `y`.
    pub fn derivative_from_output(&self, y: f64) -> f64 {
        match self {
            Self::Identity => 1.0,
            Self::Sigmoid => y * (1.0 - y),
            Self::Exponential => y,
        }
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Which family a kernel initializer is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Normal,
    Uniform,
}

/// A concrete, fully-resolved weight initializer.
///
/// Produced by the initializer resolver from a group's raw [`KernelParams`]
/// merged with the backend default table; by the time a graph is built every
/// group carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Initializer {
    Normal { mean: f64, stddev: f64 },
    Uniform { minval: f64, maxval: f64 },
}

impl Initializer {
    pub fn kind(&self) -> DistributionKind {
        match self {
            Self::Normal { .. } => DistributionKind::Normal,
            Self::Uniform { .. } => DistributionKind::Uniform,
        }
    }

    /// Draw one weight. Degenerate ranges (stddev 0, minval == maxval)
    /// collapse to a constant; inverted uniform bounds are reordered.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Self::Normal { mean, stddev } => {
                if stddev == 0.0 {
                    mean
                } else {
                    Normal::new(mean, stddev)
                        .map(|dist| dist.sample(rng))
                        .unwrap_or(mean)
                }
            }
            Self::Uniform { minval, maxval } => {
                let (lo, hi) = if minval <= maxval {
                    (minval, maxval)
                } else {
                    (maxval, minval)
                };
                if lo == hi {
                    lo
                } else {
                    rng.gen_range(lo..hi)
                }
            }
        }
    }
}

/// Raw, partially-specified initializer request attached to a parameter
/// group. Missing fields are filled from the backend default table during
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KernelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distrib: Option<DistributionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stddev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxval: Option<f64>,
}
