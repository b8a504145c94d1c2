//! Immutable trained model bundle installed into the [`ModelSlot`](crate::slot::ModelSlot).

use crate::als::AlsFactors;
use crate::knn::ItemNeighbours;
use crate::matrix::CsrMatrix;
use crate::vocab::Vocabulary;
use chrono::{DateTime, Utc};
use flrec_core::error::{RecError, RecResult};
use flrec_core::types::{ModelKind, ModelStats};
use ndarray::{Array2, Axis};

/// Factors plus unit-length item rows for cosine item similarity.
#[derive(Debug, Clone)]
pub struct AlsModel {
    factors: AlsFactors,
    normalized_items: Array2<f32>,
}

impl AlsModel {
    pub fn new(factors: AlsFactors) -> Self {
        let mut normalized_items = factors.item_factors.clone();
        for mut row in normalized_items.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }
        Self {
            factors,
            normalized_items,
        }
    }

    pub fn item_factors(&self) -> &Array2<f32> {
        &self.factors.item_factors
    }

    pub fn user_factors(&self) -> &Array2<f32> {
        &self.factors.user_factors
    }

    pub fn normalized_items(&self) -> &Array2<f32> {
        &self.normalized_items
    }

    pub fn loss(&self) -> f64 {
        self.factors.loss
    }
}

/// The trained model, one variant per recommender family.
#[derive(Debug, Clone)]
pub enum TrainedModel {
    Als(AlsModel),
    ItemKnn(ItemNeighbours),
}

/// One complete, immutable model instance. A retrain builds a new snapshot;
/// nothing in here is ever mutated once it is shared.
#[derive(Debug)]
pub struct ModelSnapshot {
    generation: u64,
    kind: ModelKind,
    trained_at: DateTime<Utc>,
    training_ms: u64,
    items: Vocabulary,
    users: Vocabulary,
    /// users x items confidence weights; non-zero means "already interacted".
    user_items: CsrMatrix,
    model: TrainedModel,
}

impl ModelSnapshot {
    pub fn new(
        kind: ModelKind,
        items: Vocabulary,
        users: Vocabulary,
        user_items: CsrMatrix,
        model: TrainedModel,
        training_ms: u64,
    ) -> Self {
        Self {
            generation: 0,
            kind,
            trained_at: Utc::now(),
            training_ms,
            items,
            users,
            user_items,
            model,
        }
    }

    /// Stamp the install generation. Only the slot calls this, before sharing.
    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Verify every component agrees on the vocabulary sizes.
    pub fn check_consistency(&self) -> RecResult<()> {
        let (items, users) = (self.items.len(), self.users.len());
        if items == 0 || users == 0 {
            return Err(RecError::InvalidSnapshot(format!(
                "empty vocabulary ({items} items, {users} users)"
            )));
        }
        if self.user_items.rows() != users || self.user_items.cols() != items {
            return Err(RecError::InvalidSnapshot(format!(
                "interaction matrix is {}x{}, expected {users}x{items}",
                self.user_items.rows(),
                self.user_items.cols()
            )));
        }
        match &self.model {
            TrainedModel::Als(als) => {
                if als.item_factors().nrows() != items || als.user_factors().nrows() != users {
                    return Err(RecError::InvalidSnapshot(format!(
                        "factor rows {}/{} do not match vocabularies {items}/{users}",
                        als.item_factors().nrows(),
                        als.user_factors().nrows()
                    )));
                }
                if als.item_factors().ncols() != als.user_factors().ncols() {
                    return Err(RecError::InvalidSnapshot(
                        "item and user factors differ in dimension".into(),
                    ));
                }
                if als.item_factors().iter().any(|v| !v.is_finite())
                    || als.user_factors().iter().any(|v| !v.is_finite())
                {
                    return Err(RecError::InvalidSnapshot("non-finite factor values".into()));
                }
            }
            TrainedModel::ItemKnn(knn) => {
                if knn.items() != items || knn.similarity().cols() != items {
                    return Err(RecError::InvalidSnapshot(format!(
                        "neighbour matrix covers {} items, expected {items}",
                        knn.items()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn items(&self) -> &Vocabulary {
        &self.items
    }

    pub fn users(&self) -> &Vocabulary {
        &self.users
    }

    pub fn user_items(&self) -> &CsrMatrix {
        &self.user_items
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            generation: self.generation,
            kind: self.kind,
            items: self.items.len(),
            users: self.users.len(),
            interactions: self.user_items.nnz(),
            trained_at: self.trained_at,
            training_ms: self.training_ms,
            loss: match &self.model {
                TrainedModel::Als(als) => Some(als.loss()),
                TrainedModel::ItemKnn(_) => None,
            },
        }
    }
}
