//! The layered computation graph reproducing the IRT response function.

use ndarray::{Array1, Array2};
use px_types::{sigmoid, Activation, ModelConfiguration, ModelError, ParameterGroup, Regularization};
use rand::Rng;

pub const LAYER_ABILITY: &str = "latent_trait/ability";
pub const LAYER_DIFFICULTY: &str = "difficulty_level";
pub const LAYER_DISCRIMINATION: &str = "disc_param";
pub const LAYER_GUESS: &str = "guessing_param";
pub const LAYER_SLIP: &str = "slip_param";
pub const LAYER_OUTPUT: &str = "prediction_layer";

/// One dense projection: `activation(x · W + b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    pub name: String,
    /// Kernel, shape `(in_dim, units)`.
    pub weights: Array2<f64>,
    pub bias: Option<Array1<f64>>,
    pub trainable: bool,
    pub activation: Activation,
    pub regularization: Regularization,
}

impl DenseLayer {
    /// Build a layer from a resolved parameter group, sampling initial
    /// weights from the group's cached kernel initializer.
    pub fn from_group<R: Rng + ?Sized>(
        name: &str,
        group: &ParameterGroup,
        in_dim: usize,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let init = group
            .kernel_init
            .ok_or_else(|| ModelError::UnresolvedInitializer {
                group: name.to_string(),
            })?;
        let weights = Array2::from_shape_fn((in_dim, group.units), |_| init.sample(rng));
        let bias = group
            .use_bias
            .then(|| Array1::from_elem(group.units, group.bias_init.unwrap_or(group.bias_value)));
        Ok(Self {
            name: name.to_string(),
            weights,
            bias,
            trainable: group.trainable,
            activation: group.activation,
            regularization: group.regularization,
        })
    }

    /// Fixed averaging aggregator (the prediction head): every weight is
    /// `1 / in_dim`, so multi-trait outputs stay on the probability scale.
    /// Collapses to an all-ones pass-through in the single-trait case.
    pub fn mean(name: &str, in_dim: usize, units: usize) -> Self {
        Self {
            name: name.to_string(),
            weights: Array2::from_elem((in_dim, units), 1.0 / in_dim.max(1) as f64),
            bias: None,
            trainable: false,
            activation: Activation::Identity,
            regularization: Regularization::default(),
        }
    }

    pub fn units(&self) -> usize {
        self.weights.ncols()
    }

    pub fn in_dim(&self) -> usize {
        self.weights.nrows()
    }

    /// Linear projection before activation.
    pub fn project(&self, input: &Array2<f64>) -> Array2<f64> {
        let mut z = input.dot(&self.weights);
        if let Some(bias) = &self.bias {
            z += bias;
        }
        z
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let activation = self.activation;
        self.project(input).mapv(|x| activation.apply(x))
    }
}

/// The assembled proxy network:
/// `p = g + (1 - s - g) * sigmoid(a * (theta - b))`
/// with theta projected from the user-identity input and b/a/g/s from the
/// question-identity input, averaged over traits by a fixed head.
#[derive(Debug, Clone)]
pub struct IrtNetwork {
    pub user_dim: usize,
    pub item_dim: usize,
    pub ability: DenseLayer,
    pub difficulty: DenseLayer,
    pub discrimination: DenseLayer,
    pub guess: DenseLayer,
    pub slip: DenseLayer,
    pub output: DenseLayer,
    /// The configuration this network was built from.
    pub config: ModelConfiguration,
}

impl IrtNetwork {
    /// Activations of every intermediate stage, used by the trainer.
    pub(crate) fn forward_stages(
        &self,
        x_user: &Array2<f64>,
        x_questions: &Array2<f64>,
    ) -> ForwardStages {
        let theta = self.ability.forward(x_user);
        let b = self.difficulty.forward(x_questions);
        let a = self.discrimination.forward(x_questions);
        let g = self.guess.forward(x_questions);
        let s = self.slip.forward(x_questions);

        let z = &a * &(&theta - &b);
        let sig = z.mapv(sigmoid);
        // coefficient (1 - s - g) on the sigmoid term
        let coeff = (&s + &g).mapv(|v| 1.0 - v);
        let p = &g + &(&coeff * &sig);
        let out = self.output.forward(&p);

        ForwardStages {
            theta,
            b,
            a,
            g,
            s,
            sig,
            p,
            out,
        }
    }

    /// Scalar predictions, one per row.
    pub fn predict(&self, x_user: &Array2<f64>, x_questions: &Array2<f64>) -> Array1<f64> {
        let stages = self.forward_stages(x_user, x_questions);
        stages.out.column(0).to_owned()
    }

    /// Total number of weights in trainable layers (bias included).
    pub fn trainable_parameter_count(&self) -> usize {
        self.layers()
            .into_iter()
            .filter(|layer| layer.trainable)
            .map(|layer| layer.weights.len() + layer.bias.as_ref().map_or(0, Array1::len))
            .sum()
    }

    pub fn layers(&self) -> [&DenseLayer; 6] {
        [
            &self.ability,
            &self.difficulty,
            &self.discrimination,
            &self.guess,
            &self.slip,
            &self.output,
        ]
    }

    pub fn layers_mut(&mut self) -> [&mut DenseLayer; 6] {
        [
            &mut self.ability,
            &mut self.difficulty,
            &mut self.discrimination,
            &mut self.guess,
            &mut self.slip,
            &mut self.output,
        ]
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&DenseLayer> {
        self.layers().into_iter().find(|layer| layer.name == name)
    }
}

/// Intermediate activations captured during one forward pass.
pub(crate) struct ForwardStages {
    pub theta: Array2<f64>,
    pub b: Array2<f64>,
    pub a: Array2<f64>,
    pub g: Array2<f64>,
    pub s: Array2<f64>,
    pub sig: Array2<f64>,
    #[allow(dead_code)]
    pub p: Array2<f64>,
    pub out: Array2<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initializers::InitializerResolver;
    use crate::spec::IrtModelSpec;
    use ndarray::arr2;
    use px_types::IrtVariant;
    use rand::SeedableRng;

    fn rasch_network(user_dim: usize, item_dim: usize) -> IrtNetwork {
        let spec = IrtModelSpec::new(IrtVariant::Rasch);
        let mut config =
            ModelConfiguration::from_value(&spec.default_configuration()).unwrap();
        InitializerResolver::new()
            .resolve_configuration(&mut config)
            .unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        spec.create_model(&config, user_dim, item_dim, &mut rng)
            .unwrap()
    }

    #[test]
    fn rasch_discrimination_is_exactly_one() {
        let network = rasch_network(3, 4);
        // stddev-0 kernel + exponential activation: a = exp(0) = 1
        let x_q = arr2(&[[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]);
        let a = network.discrimination.forward(&x_q);
        for value in a.iter() {
            assert!((value - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn forward_matches_closed_form() {
        let network = rasch_network(2, 2);
        let x_u = arr2(&[[1.0, 0.0]]);
        let x_q = arr2(&[[0.0, 1.0]]);

        let theta = network.ability.forward(&x_u)[[0, 0]];
        let b = network.difficulty.forward(&x_q)[[0, 0]];
        let a = network.discrimination.forward(&x_q)[[0, 0]];
        let g = network.guess.forward(&x_q)[[0, 0]];
        let s = network.slip.forward(&x_q)[[0, 0]];
        let expected = g + (1.0 - s - g) * sigmoid(a * (theta - b));

        let got = network.predict(&x_u, &x_q)[0];
        assert!((got - expected).abs() < 1e-12, "{got} vs {expected}");
    }

    #[test]
    fn predictions_are_probabilities() {
        let network = rasch_network(5, 6);
        let x_u = Array2::from_shape_fn((8, 5), |(i, j)| ((i + j) % 5 == 0) as u8 as f64);
        let x_q = Array2::from_shape_fn((8, 6), |(i, j)| ((i + j) % 6 == 0) as u8 as f64);
        for p in network.predict(&x_u, &x_q).iter() {
            assert!((0.0..=1.0).contains(p), "prediction out of range: {p}");
        }
    }

    #[test]
    fn multi_trait_predictions_stay_on_probability_scale() {
        let spec = IrtModelSpec::new(IrtVariant::Rasch);
        let mut config =
            ModelConfiguration::from_value(&spec.default_configuration()).unwrap();
        for (_, group) in config.groups_mut() {
            group.units = 3;
        }
        InitializerResolver::new()
            .resolve_configuration(&mut config)
            .unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(17);
        let network = spec.create_model(&config, 4, 5, &mut rng).unwrap();

        let x_u = Array2::from_shape_fn((10, 4), |(i, j)| (i % 4 == j) as u8 as f64);
        let x_q = Array2::from_shape_fn((10, 5), |(i, j)| (i % 5 == j) as u8 as f64);
        for p in network.predict(&x_u, &x_q).iter() {
            assert!((0.0..=1.0).contains(p), "prediction out of range: {p}");
        }
    }

    #[test]
    fn trainable_count_tracks_released_groups() {
        let rasch = rasch_network(3, 4);
        // Only ability (3x1) and difficulty (4x1) train under Rasch.
        assert_eq!(rasch.trainable_parameter_count(), 7);
    }

    #[test]
    fn unresolved_group_is_rejected() {
        let group = ParameterGroup::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let err = DenseLayer::from_group("latent_trait/ability", &group, 3, &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::UnresolvedInitializer { .. }));
    }
}
