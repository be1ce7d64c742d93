//! IRT model family variants and the fit-time promotion rule.

use serde::{Deserialize, Serialize};

use crate::config::ModelConfiguration;

/// Which member of the IRT family a configuration describes.
///
/// The variant is a plain tag computed by [`IrtVariant::classify`]; nothing
/// downstream mutates a model's identity at runtime. It drives metric and
/// coefficient reporting: under `ThreeParameter`/`FourParameter` the guess
/// (and for `FourParameter` the slip) weight is reported on the probability
/// scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrtVariant {
    Rasch,
    TwoParameter,
    ThreeParameter,
    FourParameter,
}

impl IrtVariant {
    /// Reclassify a declared variant against the merged configuration.
    ///
    /// A `ThreeParameter` model whose slip group is marked trainable is a
    /// four-parameter model; everything else keeps its declared identity.
    pub fn classify(declared: IrtVariant, config: &ModelConfiguration) -> IrtVariant {
        if declared == IrtVariant::ThreeParameter && config.slip.trainable {
            IrtVariant::FourParameter
        } else {
            declared
        }
    }

    /// Short reporting label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rasch => "rasch",
            Self::TwoParameter => "two_pl",
            Self::ThreeParameter => "three_pl",
            Self::FourParameter => "four_pl",
        }
    }

    /// Whether the guessing weight is reported through the logistic
    /// inverse-link.
    pub fn guess_on_probability_scale(&self) -> bool {
        matches!(self, Self::ThreeParameter | Self::FourParameter)
    }

    /// Whether the slip weight is reported through the logistic inverse-link.
    pub fn slip_on_probability_scale(&self) -> bool {
        matches!(self, Self::FourParameter)
    }
}
