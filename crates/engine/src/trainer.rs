//! Full training pipeline: raw records -> vocabularies -> weighted matrix ->
//! model of the configured kind -> snapshot.

use crate::als::{self, AlsParams};
use crate::knn::ItemNeighbours;
use crate::matrix::InteractionMatrixBuilder;
use crate::snapshot::{AlsModel, ModelSnapshot, TrainedModel};
use crate::weighting::{self, Bm25Params};
use flrec_core::config::ModelConfig;
use flrec_core::error::{RecError, RecResult};
use flrec_core::types::{ModelKind, RawInteraction, WeightingScheme};
use std::time::Instant;
use tracing::info;

/// Builds snapshots. Holds only configuration, so one instance can be shared
/// by every retrain pass.
#[derive(Debug, Clone)]
pub struct Trainer {
    kind: ModelKind,
    weighting: WeightingScheme,
    bm25: Bm25Params,
    knn_bm25: Bm25Params,
    als: AlsParams,
    neighbours: usize,
}

impl Trainer {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            kind: config.kind,
            weighting: config.weighting,
            bm25: Bm25Params {
                k1: config.bm25.k1,
                b: config.bm25.b,
            },
            knn_bm25: Bm25Params {
                k1: config.knn_bm25.k1,
                b: config.knn_bm25.b,
            },
            als: AlsParams::from(config),
            neighbours: config.neighbours,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn train<'a>(
        &self,
        records: impl IntoIterator<Item = &'a RawInteraction>,
    ) -> RecResult<ModelSnapshot> {
        let start = Instant::now();

        let mut builder = InteractionMatrixBuilder::new();
        builder.extend(records);
        let data = builder.build();

        if data.items.is_empty() || data.users.is_empty() {
            return Err(RecError::DegenerateInput(format!(
                "{} items and {} users in training data",
                data.items.len(),
                data.users.len()
            )));
        }

        let (weights, model) = match self.kind {
            ModelKind::Als => {
                let weights = weighting::apply(self.weighting, self.bm25, &data.counts);
                let factors = als::factorize(&weights, &self.als)?;
                (weights, TrainedModel::Als(AlsModel::new(factors)))
            }
            ModelKind::Cosine | ModelKind::TfIdf | ModelKind::Bm25 => {
                let weights = match self.kind {
                    ModelKind::Cosine => weighting::l2_normalize_rows(&data.counts),
                    ModelKind::TfIdf => weighting::tfidf(&data.counts),
                    _ => weighting::bm25(&data.counts, self.knn_bm25),
                };
                let knn = ItemNeighbours::fit(&weights, self.neighbours)?;
                (weights, TrainedModel::ItemKnn(knn))
            }
        };

        let training_ms = start.elapsed().as_millis() as u64;
        info!(
            kind = %self.kind,
            items = data.items.len(),
            users = data.users.len(),
            interactions = weights.nnz(),
            training_ms = training_ms,
            "Snapshot trained"
        );

        Ok(ModelSnapshot::new(
            self.kind,
            data.items,
            data.users,
            weights.transpose(),
            model,
            training_ms,
        ))
    }
}
