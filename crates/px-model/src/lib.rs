//! # px-model
//!
//! Proxy-model machinery: resolving weight initializers from per-group
//! configuration, translating an IRT model family into a layered
//! computation graph, training that graph by gradient descent, and
//! persisting/restoring trained weight state.

mod checkpoint;
mod graph;
mod initializers;
mod presets;
mod spec;
mod train;

pub use checkpoint::{LayerWeights, WeightCheckpoint};
pub use graph::{
    DenseLayer, IrtNetwork, LAYER_ABILITY, LAYER_DIFFICULTY, LAYER_DISCRIMINATION, LAYER_GUESS,
    LAYER_OUTPUT, LAYER_SLIP,
};
pub use initializers::{InitializerResolver, ALTERNATE_BACKEND, PRIMARY_BACKEND};
pub use presets::variant_preset;
pub use spec::IrtModelSpec;
pub use train::{evaluate, train, EpochRecord, EvalMetrics, TrainOptions, TrainReport};
