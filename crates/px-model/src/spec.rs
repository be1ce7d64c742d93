//! Declarative translation of an IRT variant into a computation graph.

use px_types::{IrtVariant, ModelConfiguration, ModelError};
use rand::Rng;
use serde_json::Value;

use crate::graph::{
    DenseLayer, IrtNetwork, LAYER_ABILITY, LAYER_DIFFICULTY, LAYER_DISCRIMINATION, LAYER_GUESS,
    LAYER_OUTPUT, LAYER_SLIP,
};
use crate::presets::variant_preset;

/// Builds proxy networks for one declared IRT variant.
#[derive(Debug, Clone, Copy)]
pub struct IrtModelSpec {
    pub declared: IrtVariant,
}

impl IrtModelSpec {
    pub fn new(declared: IrtVariant) -> Self {
        Self { declared }
    }

    /// The variant's default configuration tree; user overrides merge onto
    /// this.
    pub fn default_configuration(&self) -> Value {
        variant_preset(self.declared)
    }

    /// Assemble a fresh network from a resolved configuration.
    ///
    /// Fails with `InvalidShape` when either input feature count is zero or
    /// the parameter groups disagree on unit counts.
    pub fn create_model<R: Rng + ?Sized>(
        &self,
        config: &ModelConfiguration,
        user_dim: usize,
        item_dim: usize,
        rng: &mut R,
    ) -> Result<IrtNetwork, ModelError> {
        if user_dim == 0 || item_dim == 0 {
            return Err(ModelError::InvalidShape {
                message: format!(
                    "input feature counts must be positive (users: {user_dim}, items: {item_dim})"
                ),
            });
        }

        let units = config.ability.units;
        for (name, group) in config.groups() {
            if group.units == 0 {
                return Err(ModelError::InvalidShape {
                    message: format!("group '{name}' has zero units"),
                });
            }
            if group.units != units {
                return Err(ModelError::InvalidShape {
                    message: format!(
                        "group '{name}' has {} units, expected {units} to match ability_params",
                        group.units
                    ),
                });
            }
        }
        if config.hyper.units == 0 {
            return Err(ModelError::InvalidShape {
                message: "hyper_params has zero output units".to_string(),
            });
        }

        let ability = DenseLayer::from_group(LAYER_ABILITY, &config.ability, user_dim, rng)?;
        let difficulty =
            DenseLayer::from_group(LAYER_DIFFICULTY, &config.difficulty, item_dim, rng)?;
        let discrimination =
            DenseLayer::from_group(LAYER_DISCRIMINATION, &config.discrimination, item_dim, rng)?;
        let guess = DenseLayer::from_group(LAYER_GUESS, &config.guess, item_dim, rng)?;
        let slip = DenseLayer::from_group(LAYER_SLIP, &config.slip, item_dim, rng)?;
        let output = DenseLayer::mean(LAYER_OUTPUT, units, config.hyper.units);

        Ok(IrtNetwork {
            user_dim,
            item_dim,
            ability,
            difficulty,
            discrimination,
            guess,
            slip,
            output,
            config: config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initializers::InitializerResolver;
    use rand::SeedableRng;

    fn resolved_config(variant: IrtVariant) -> ModelConfiguration {
        let mut config =
            ModelConfiguration::from_value(&variant_preset(variant)).unwrap();
        InitializerResolver::new()
            .resolve_configuration(&mut config)
            .unwrap();
        config
    }

    #[test]
    fn zero_input_dims_are_invalid() {
        let spec = IrtModelSpec::new(IrtVariant::Rasch);
        let config = resolved_config(IrtVariant::Rasch);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert!(matches!(
            spec.create_model(&config, 0, 4, &mut rng),
            Err(ModelError::InvalidShape { .. })
        ));
        assert!(matches!(
            spec.create_model(&config, 4, 0, &mut rng),
            Err(ModelError::InvalidShape { .. })
        ));
    }

    #[test]
    fn mismatched_group_units_are_invalid() {
        let spec = IrtModelSpec::new(IrtVariant::TwoParameter);
        let mut config = resolved_config(IrtVariant::TwoParameter);
        config.guess.units = 3;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let err = spec.create_model(&config, 4, 4, &mut rng).unwrap_err();
        assert!(err.to_string().contains("guess_params"));
    }

    #[test]
    fn layers_carry_configured_trainability() {
        let spec = IrtModelSpec::new(IrtVariant::ThreeParameter);
        let config = resolved_config(IrtVariant::ThreeParameter);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let network = spec.create_model(&config, 3, 5, &mut rng).unwrap();

        assert!(network.discrimination.trainable);
        assert!(network.guess.trainable);
        assert!(!network.slip.trainable);
        assert!(!network.output.trainable);
        assert_eq!(network.guess.bias.as_ref().unwrap().len(), 1);
        assert!(network.ability.bias.is_none());
    }

    #[test]
    fn output_head_is_fixed_and_averages() {
        let spec = IrtModelSpec::new(IrtVariant::Rasch);
        let mut config = resolved_config(IrtVariant::Rasch);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);

        // single trait: pass-through
        let network = spec.create_model(&config, 2, 2, &mut rng).unwrap();
        assert!(network.output.weights.iter().all(|w| *w == 1.0));
        assert!(network.output.bias.is_none());
        assert!(!network.output.trainable);

        // two traits: each column contributes half
        for (_, group) in config.groups_mut() {
            group.units = 2;
        }
        let wide = spec.create_model(&config, 2, 2, &mut rng).unwrap();
        assert!(wide.output.weights.iter().all(|w| *w == 0.5));
    }
}
