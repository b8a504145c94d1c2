pub mod als;
pub mod engine;
pub mod knn;
pub mod matrix;
pub mod retrainer;
pub mod scorer;
pub mod slot;
pub mod snapshot;
pub mod source;
pub mod trainer;
pub mod vocab;
pub mod weighting;

pub use engine::{Ranked, RecommendationEngine};
pub use retrainer::{RetrainOutcome, RetrainState, Retrainer};
pub use scorer::{ExactScan, SimilarityScorer, TopKSearch};
pub use slot::ModelSlot;
pub use snapshot::{ModelSnapshot, TrainedModel};
pub use source::{CsvFileSource, InteractionSource, MemorySource};
pub use trainer::Trainer;
pub use vocab::Vocabulary;
