//! Persisted trained-weight state, reloadable into a rebuilt graph.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use px_types::{ModelError, PxResult};
use serde::{Deserialize, Serialize};

use crate::graph::IrtNetwork;

/// One layer's weight state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    pub name: String,
    /// Kernel shape `(in_dim, units)`.
    pub shape: (usize, usize),
    pub weights: Vec<f64>,
    pub bias: Option<Vec<f64>>,
}

/// The full weight state of a network, in layer order.
///
/// Loading validates layer names and shapes against the freshly rebuilt
/// graph; any disagreement means the checkpoint does not belong to an
/// architecturally identical model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightCheckpoint {
    pub layers: Vec<LayerWeights>,
}

impl WeightCheckpoint {
    pub fn capture(network: &IrtNetwork) -> Self {
        let layers = network
            .layers()
            .into_iter()
            .map(|layer| LayerWeights {
                name: layer.name.clone(),
                shape: (layer.in_dim(), layer.units()),
                weights: layer.weights.iter().copied().collect(),
                bias: layer.bias.as_ref().map(|b| b.to_vec()),
            })
            .collect();
        Self { layers }
    }

    /// Load this checkpoint's weights into `network`.
    pub fn apply(&self, network: &mut IrtNetwork) -> Result<(), ModelError> {
        let targets = network.layers_mut();
        if self.layers.len() != targets.len() {
            return Err(ModelError::InvalidShape {
                message: format!(
                    "checkpoint has {} layers, graph has {}",
                    self.layers.len(),
                    targets.len()
                ),
            });
        }

        for (saved, layer) in self.layers.iter().zip(targets) {
            if saved.name != layer.name {
                return Err(ModelError::InvalidShape {
                    message: format!(
                        "checkpoint layer '{}' does not match graph layer '{}'",
                        saved.name, layer.name
                    ),
                });
            }
            if saved.shape != (layer.in_dim(), layer.units()) {
                return Err(ModelError::InvalidShape {
                    message: format!(
                        "layer '{}': checkpoint shape {:?} does not match graph ({}, {})",
                        saved.name,
                        saved.shape,
                        layer.in_dim(),
                        layer.units()
                    ),
                });
            }
            let weights = Array2::from_shape_vec(saved.shape, saved.weights.clone()).map_err(
                |err| ModelError::InvalidShape {
                    message: format!("layer '{}': {err}", saved.name),
                },
            )?;
            layer.weights = weights;

            match (&saved.bias, &mut layer.bias) {
                (Some(saved_bias), Some(bias)) if saved_bias.len() == bias.len() => {
                    *bias = Array1::from(saved_bias.clone());
                }
                (None, None) => {}
                _ => {
                    return Err(ModelError::InvalidShape {
                        message: format!("layer '{}': bias layout mismatch", saved.name),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> PxResult<()> {
        let encoded = serde_json::to_vec_pretty(self)?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PxResult<Self> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
