pub mod config;
pub mod errors;
pub mod initializer;
pub mod variant;

pub use config::*;
pub use errors::*;
pub use initializer::*;
pub use variant::*;
