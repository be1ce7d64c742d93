//! Gradient-descent training and evaluation for the IRT graph.
//!
//! Gradients are analytic through the closed form
//! `p = g + (1 - s - g) * sigmoid(a * (theta - b))`; only layers marked
//! trainable receive updates. Cancellation is cooperative, checked between
//! epochs.

use ndarray::{s, Array1, Array2};
use px_types::{LossKind, ModelError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::graph::{DenseLayer, IrtNetwork};

const PROB_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 64,
            batch_size: 16,
            validation_split: 0.2,
        }
    }
}

/// Evaluation metrics on one dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalMetrics {
    pub loss: f64,
    pub mean_error: f64,
    pub mean_accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: Option<f64>,
}

/// Outcome of one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub history: Vec<EpochRecord>,
    pub cancelled: bool,
}

fn check_shapes(
    network: &IrtNetwork,
    x_user: &Array2<f64>,
    x_questions: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<(), ModelError> {
    if x_user.ncols() != network.user_dim || x_questions.ncols() != network.item_dim {
        return Err(ModelError::InvalidShape {
            message: format!(
                "input widths (users: {}, items: {}) disagree with the graph (users: {}, items: {})",
                x_user.ncols(),
                x_questions.ncols(),
                network.user_dim,
                network.item_dim
            ),
        });
    }
    if x_user.nrows() != x_questions.nrows() || x_user.nrows() != y.len() {
        return Err(ModelError::InvalidShape {
            message: format!(
                "row counts disagree (users: {}, items: {}, targets: {})",
                x_user.nrows(),
                x_questions.nrows(),
                y.len()
            ),
        });
    }
    Ok(())
}

/// Train in place. The validation split is taken from the tail of the data,
/// and per-epoch train/validation losses are recorded in the report.
pub fn train(
    network: &mut IrtNetwork,
    x_user: &Array2<f64>,
    x_questions: &Array2<f64>,
    y: &Array1<f64>,
    options: &TrainOptions,
    cancel: Option<&AtomicBool>,
) -> Result<TrainReport, ModelError> {
    check_shapes(network, x_user, x_questions, y)?;
    let n = y.len();
    if n == 0 {
        return Err(ModelError::InvalidShape {
            message: "empty training set".to_string(),
        });
    }

    let val_rows = ((n as f64) * options.validation_split.clamp(0.0, 0.9)).round() as usize;
    let train_rows = (n - val_rows).max(1);
    let batch_size = options.batch_size.max(1);
    let lr = network.config.hyper.learning_rate;
    let loss_kind = network.config.hyper.loss;

    let mut history = Vec::with_capacity(options.epochs);
    let mut cancelled = false;

    for epoch in 0..options.epochs {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            cancelled = true;
            break;
        }

        let mut start = 0;
        while start < train_rows {
            let end = (start + batch_size).min(train_rows);
            let xb_u = x_user.slice(s![start..end, ..]).to_owned();
            let xb_q = x_questions.slice(s![start..end, ..]).to_owned();
            let yb = y.slice(s![start..end]).to_owned();
            sgd_step(network, &xb_u, &xb_q, &yb, lr, loss_kind);
            start = end;
        }

        let train_slice = (
            x_user.slice(s![..train_rows, ..]).to_owned(),
            x_questions.slice(s![..train_rows, ..]).to_owned(),
            y.slice(s![..train_rows]).to_owned(),
        );
        let train_loss = evaluate(network, &train_slice.0, &train_slice.1, &train_slice.2).loss;
        let val_loss = (val_rows > 0).then(|| {
            let xv_u = x_user.slice(s![train_rows.., ..]).to_owned();
            let xv_q = x_questions.slice(s![train_rows.., ..]).to_owned();
            let yv = y.slice(s![train_rows..]).to_owned();
            evaluate(network, &xv_u, &xv_q, &yv).loss
        });

        debug!(epoch, train_loss, ?val_loss, "epoch complete");
        history.push(EpochRecord {
            epoch,
            train_loss,
            val_loss,
        });
    }

    Ok(TrainReport { history, cancelled })
}

/// One mini-batch gradient step.
fn sgd_step(
    network: &mut IrtNetwork,
    x_user: &Array2<f64>,
    x_questions: &Array2<f64>,
    y: &Array1<f64>,
    lr: f64,
    loss_kind: LossKind,
) {
    let stages = network.forward_stages(x_user, x_questions);
    let rows = y.len() as f64;

    // dL/d(out), on the scalar prediction head (column 0).
    let out = stages.out.column(0).to_owned();
    let d_out: Array1<f64> = match loss_kind {
        LossKind::BinaryCrossentropy => {
            ndarray::Zip::from(&out).and(y).map_collect(|&o, &t| {
                let o = o.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                (o - t) / (o * (1.0 - o)) / rows
            })
        }
        LossKind::MeanSquaredError => {
            ndarray::Zip::from(&out).and(y).map_collect(|&o, &t| 2.0 * (o - t) / rows)
        }
    };

    // dL/dP through the fixed aggregator: outer(d_out, W_out[:, 0]).
    let w_out = network.output.weights.column(0).to_owned();
    let units = w_out.len();
    let d_p = Array2::from_shape_fn((y.len(), units), |(i, j)| d_out[i] * w_out[j]);

    // Shared chain through the sigmoid: dP/dz = (1 - s - g) * sig'.
    let coeff = ndarray::Zip::from(&stages.s)
        .and(&stages.g)
        .map_collect(|&s, &g| 1.0 - s - g);
    let sig_prime = stages.sig.mapv(|v| v * (1.0 - v));
    let base = &d_p * &coeff * &sig_prime;

    // z = a * (theta - b)
    let ability_act = network.ability.activation;
    let d_theta = (&base * &stages.a)
        .zip_apply(&stages.theta, |d, y_out| d * ability_act.derivative_from_output(y_out));

    let difficulty_act = network.difficulty.activation;
    let d_b = (&base * &stages.a)
        .zip_apply(&stages.b, |d, y_out| -d * difficulty_act.derivative_from_output(y_out));

    let disc_act = network.discrimination.activation;
    let theta_minus_b = &stages.theta - &stages.b;
    let d_a = (&base * &theta_minus_b)
        .zip_apply(&stages.a, |d, y_out| d * disc_act.derivative_from_output(y_out));

    // dP/dg = 1 - sig, dP/ds = -sig
    let guess_act = network.guess.activation;
    let d_g = (&d_p * &stages.sig.mapv(|v| 1.0 - v))
        .zip_apply(&stages.g, |d, y_out| d * guess_act.derivative_from_output(y_out));

    let slip_act = network.slip.activation;
    let d_s = (&d_p * &stages.sig)
        .zip_apply(&stages.s, |d, y_out| -d * slip_act.derivative_from_output(y_out));

    apply_update(&mut network.ability, x_user, &d_theta, lr);
    apply_update(&mut network.difficulty, x_questions, &d_b, lr);
    apply_update(&mut network.discrimination, x_questions, &d_a, lr);
    apply_update(&mut network.guess, x_questions, &d_g, lr);
    apply_update(&mut network.slip, x_questions, &d_s, lr);
}

trait ZipApply {
    fn zip_apply<F: Fn(f64, f64) -> f64>(self, other: &Array2<f64>, f: F) -> Array2<f64>;
}

impl ZipApply for Array2<f64> {
    fn zip_apply<F: Fn(f64, f64) -> f64>(self, other: &Array2<f64>, f: F) -> Array2<f64> {
        ndarray::Zip::from(&self).and(other).map_collect(|&a, &b| f(a, b))
    }
}

/// Apply one gradient update to a layer's kernel (and bias) if trainable.
fn apply_update(layer: &mut DenseLayer, input: &Array2<f64>, d_pre: &Array2<f64>, lr: f64) {
    if !layer.trainable {
        return;
    }
    let mut grad = input.t().dot(d_pre);
    let reg = layer.regularization;
    if reg.l1 != 0.0 || reg.l2 != 0.0 {
        grad = &grad
            + &layer
                .weights
                .mapv(|w| reg.l1 * w.signum() + 2.0 * reg.l2 * w);
    }
    layer.weights = &layer.weights - &grad.mapv(|g| g * lr);

    if let Some(bias) = &mut layer.bias {
        let grad_bias = d_pre.sum_axis(ndarray::Axis(0));
        *bias = &*bias - &grad_bias.mapv(|g| g * lr);
    }
}

/// Loss, mean absolute error and accuracy of the network on a dataset.
pub fn evaluate(
    network: &IrtNetwork,
    x_user: &Array2<f64>,
    x_questions: &Array2<f64>,
    y: &Array1<f64>,
) -> EvalMetrics {
    let predictions = network.predict(x_user, x_questions);
    let n = y.len().max(1) as f64;

    let loss = match network.config.hyper.loss {
        LossKind::BinaryCrossentropy => ndarray::Zip::from(&predictions)
            .and(y)
            .fold(0.0, |acc, &o, &t| {
                let o = o.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                acc - (t * o.ln() + (1.0 - t) * (1.0 - o).ln())
            })
            / n,
        LossKind::MeanSquaredError => ndarray::Zip::from(&predictions)
            .and(y)
            .fold(0.0, |acc, &o, &t| acc + (o - t) * (o - t))
            / n,
    };

    let mean_error = ndarray::Zip::from(&predictions)
        .and(y)
        .fold(0.0, |acc, &o, &t| acc + (o - t).abs())
        / n;

    let mean_accuracy = ndarray::Zip::from(&predictions)
        .and(y)
        .fold(0.0, |acc, &o, &t| {
            acc + ((o >= 0.5) == (t >= 0.5)) as u8 as f64
        })
        / n;

    EvalMetrics {
        loss,
        mean_error,
        mean_accuracy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initializers::InitializerResolver;
    use crate::presets::variant_preset;
    use crate::spec::IrtModelSpec;
    use px_types::{IrtVariant, ModelConfiguration};
    use rand::SeedableRng;
    use std::sync::atomic::AtomicBool;

    fn build(variant: IrtVariant, user_dim: usize, item_dim: usize, seed: u64) -> IrtNetwork {
        let spec = IrtModelSpec::new(variant);
        let mut config = ModelConfiguration::from_value(&variant_preset(variant)).unwrap();
        InitializerResolver::new()
            .resolve_configuration(&mut config)
            .unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        spec.create_model(&config, user_dim, item_dim, &mut rng).unwrap()
    }

    /// A small response matrix: 4 users x 3 items, one-hot identity inputs,
    /// stronger users answer more items correctly.
    fn toy_data() -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let mut rows_u = Vec::new();
        let mut rows_q = Vec::new();
        let mut targets = Vec::new();
        for user in 0..4usize {
            for item in 0..3usize {
                let mut u = vec![0.0; 4];
                u[user] = 1.0;
                let mut q = vec![0.0; 3];
                q[item] = 1.0;
                rows_u.push(u);
                rows_q.push(q);
                targets.push(if user >= item { 1.0 } else { 0.0 });
            }
        }
        let n = targets.len();
        let x_u = Array2::from_shape_vec((n, 4), rows_u.concat()).unwrap();
        let x_q = Array2::from_shape_vec((n, 3), rows_q.concat()).unwrap();
        (x_u, x_q, Array1::from(targets))
    }

    #[test]
    fn training_reduces_loss() {
        let mut network = build(IrtVariant::TwoParameter, 4, 3, 3);
        let (x_u, x_q, y) = toy_data();
        let before = evaluate(&network, &x_u, &x_q, &y).loss;

        let options = TrainOptions {
            epochs: 200,
            batch_size: 4,
            validation_split: 0.0,
        };
        let report = train(&mut network, &x_u, &x_q, &y, &options, None).unwrap();
        let after = evaluate(&network, &x_u, &x_q, &y).loss;

        assert_eq!(report.history.len(), 200);
        assert!(!report.cancelled);
        assert!(after < before, "loss did not improve: {before} -> {after}");
    }

    #[test]
    fn non_trainable_layers_are_frozen() {
        let mut network = build(IrtVariant::Rasch, 4, 3, 5);
        let disc_before = network.discrimination.weights.clone();
        let guess_before = network.guess.weights.clone();
        let (x_u, x_q, y) = toy_data();

        let options = TrainOptions {
            epochs: 20,
            batch_size: 4,
            validation_split: 0.0,
        };
        train(&mut network, &x_u, &x_q, &y, &options, None).unwrap();

        assert_eq!(network.discrimination.weights, disc_before);
        assert_eq!(network.guess.weights, guess_before);
    }

    #[test]
    fn validation_split_records_val_loss() {
        let mut network = build(IrtVariant::Rasch, 4, 3, 5);
        let (x_u, x_q, y) = toy_data();
        let options = TrainOptions {
            epochs: 3,
            batch_size: 4,
            validation_split: 0.25,
        };
        let report = train(&mut network, &x_u, &x_q, &y, &options, None).unwrap();
        assert!(report.history.iter().all(|record| record.val_loss.is_some()));
    }

    #[test]
    fn cancellation_stops_between_epochs() {
        let mut network = build(IrtVariant::Rasch, 4, 3, 5);
        let (x_u, x_q, y) = toy_data();
        let cancel = AtomicBool::new(true);
        let options = TrainOptions {
            epochs: 50,
            batch_size: 4,
            validation_split: 0.0,
        };
        let report = train(&mut network, &x_u, &x_q, &y, &options, Some(&cancel)).unwrap();
        assert!(report.cancelled);
        assert!(report.history.is_empty());
    }

    #[test]
    fn wrong_input_width_is_invalid_shape() {
        let mut network = build(IrtVariant::Rasch, 4, 3, 5);
        let (x_u, _x_q, y) = toy_data();
        let bad_q = Array2::zeros((y.len(), 7));
        let err = train(
            &mut network,
            &x_u,
            &bad_q,
            &y,
            &TrainOptions::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidShape { .. }));
    }

    #[test]
    fn metrics_are_bounded() {
        let network = build(IrtVariant::Rasch, 4, 3, 9);
        let (x_u, x_q, y) = toy_data();
        let metrics = evaluate(&network, &x_u, &x_q, &y);
        assert!(metrics.loss.is_finite());
        assert!((0.0..=1.0).contains(&metrics.mean_error));
        assert!((0.0..=1.0).contains(&metrics.mean_accuracy));
    }
}
