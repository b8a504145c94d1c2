//! Recommendation engine: the read side used by request handlers.
//! Every call resolves one snapshot from the slot and answers entirely
//! against it.

use crate::scorer::SimilarityScorer;
use crate::slot::ModelSlot;
use flrec_core::error::RecResult;
use flrec_core::types::{ModelStats, ScoredItem};
use std::sync::Arc;
use tracing::debug;

/// Items answered from one snapshot, tagged with its generation.
#[derive(Debug, Clone)]
pub struct Ranked {
    pub generation: u64,
    pub items: Vec<ScoredItem>,
}

#[derive(Clone)]
pub struct RecommendationEngine {
    slot: Arc<ModelSlot>,
    scorer: SimilarityScorer,
}

impl RecommendationEngine {
    pub fn new(slot: Arc<ModelSlot>, scorer: SimilarityScorer) -> Self {
        Self { slot, scorer }
    }

    pub fn slot(&self) -> &Arc<ModelSlot> {
        &self.slot
    }

    pub fn recommend(
        &self,
        user_id: &str,
        count: usize,
        exclude_interacted: bool,
    ) -> RecResult<Ranked> {
        let snapshot = self.slot.read()?;
        let items = self
            .scorer
            .recommend_for(&snapshot, user_id, exclude_interacted, count)?;

        debug!(
            user = user_id,
            count = count,
            returned = items.len(),
            generation = snapshot.generation(),
            backend = self.scorer.backend(),
            "Recommendations scored"
        );

        Ok(Ranked {
            generation: snapshot.generation(),
            items,
        })
    }

    pub fn similar_items(&self, item_id: &str, count: usize) -> RecResult<Ranked> {
        let snapshot = self.slot.read()?;
        let items = self.scorer.similar_to(&snapshot, item_id, count)?;
        Ok(Ranked {
            generation: snapshot.generation(),
            items,
        })
    }

    pub fn stats(&self) -> RecResult<ModelStats> {
        Ok(self.slot.read()?.stats())
    }
}
