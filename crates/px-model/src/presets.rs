//! Default configuration trees per IRT variant.
//!
//! These mirror the closed-form structure of the classical models: a Rasch
//! model pins discrimination at 1 (exponential of a zero weight) and holds
//! guess/slip at a low constant through a biased sigmoid; each richer
//! variant releases one more group for training.

use px_types::IrtVariant;
use serde_json::{json, Value};

/// The base (default) configuration tree for a declared variant. User
/// overrides are merged onto this via `px_config::merge_defaults`.
pub fn variant_preset(variant: IrtVariant) -> Value {
    let disc = match variant {
        IrtVariant::Rasch => json!({
            "units": 1,
            "kernel_params": { "stddev": 0.0 },
            "train": false,
            "act": "exponential",
            "use_bias": false
        }),
        _ => json!({
            "units": 1,
            "kernel_params": {},
            "train": true,
            "act": "exponential",
            "use_bias": false
        }),
    };

    let guess = match variant {
        IrtVariant::Rasch | IrtVariant::TwoParameter => json!({
            "units": 1,
            "kernel_params": { "distrib": "uniform" },
            "bias_param": -3.5,
            "train": false,
            "act": "sigmoid",
            "use_bias": true
        }),
        IrtVariant::ThreeParameter | IrtVariant::FourParameter => json!({
            "units": 1,
            "kernel_params": { "distrib": "uniform", "minval": 0.0, "maxval": -2.5 },
            "train": true,
            "act": "sigmoid",
            "use_bias": true
        }),
    };

    let slip_train = variant == IrtVariant::FourParameter;
    let slip = json!({
        "units": 1,
        "kernel_params": { "distrib": "uniform" },
        "bias_param": -3.5,
        "train": slip_train,
        "act": "sigmoid",
        "use_bias": true
    });

    json!({
        "ability_params": { "units": 1, "kernel_params": {}, "use_bias": false },
        "diff_params": { "units": 1, "kernel_params": {}, "use_bias": false },
        "disc_params": disc,
        "guess_params": guess,
        "slip_params": slip,
        "hyper_params": { "units": 1, "optimizer": "sgd", "loss": "binary_crossentropy" }
    })
}
