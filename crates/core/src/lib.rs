pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{RecError, RecResult};
pub use types::{ModelKind, ModelStats, RawInteraction, ScoredItem, WeightingScheme};
