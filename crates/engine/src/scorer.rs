//! Query-time top-K scoring.
//!
//! Ranking is the same everywhere: descending score, ascending item code on
//! ties. Excluded items are dropped from the candidate set before ranking, so
//! a user only gets fewer than `k` results when the catalogue runs out.

use crate::snapshot::{ModelSnapshot, TrainedModel};
use flrec_core::error::{RecError, RecResult};
use flrec_core::types::ScoredItem;
use ndarray::{ArrayView1, ArrayView2};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Higher score first, lower code first on equal scores.
pub fn rank_order(a: &(u32, f32), b: &(u32, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Select and order the best `k` candidates.
pub fn top_k(mut candidates: Vec<(u32, f32)>, k: usize) -> Vec<(u32, f32)> {
    if k == 0 {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, rank_order);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(rank_order);
    candidates
}

/// "Given a vector and a corpus of vectors, return the top-K by score."
///
/// The default implementation is an exact scan; an approximate index can
/// stand in as long as it honours the same ordering and exclusion contract.
pub trait TopKSearch: Send + Sync {
    /// `excluded` holds corpus row indices sorted ascending.
    fn search(
        &self,
        query: ArrayView1<f32>,
        corpus: ArrayView2<f32>,
        k: usize,
        excluded: &[u32],
    ) -> Vec<(u32, f32)>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Brute-force dot product over every corpus row.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactScan;

impl TopKSearch for ExactScan {
    fn search(
        &self,
        query: ArrayView1<f32>,
        corpus: ArrayView2<f32>,
        k: usize,
        excluded: &[u32],
    ) -> Vec<(u32, f32)> {
        let candidates = corpus
            .outer_iter()
            .enumerate()
            .filter(|(code, _)| excluded.binary_search(&(*code as u32)).is_err())
            .map(|(code, row)| (code as u32, query.dot(&row)))
            .collect();
        top_k(candidates, k)
    }

    fn name(&self) -> &str {
        "exact_scan"
    }
}

/// Recommends items for users and similar items for items against one snapshot.
#[derive(Clone)]
pub struct SimilarityScorer {
    search: Arc<dyn TopKSearch>,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(Arc::new(ExactScan))
    }
}

impl SimilarityScorer {
    pub fn new(search: Arc<dyn TopKSearch>) -> Self {
        Self { search }
    }

    pub fn backend(&self) -> &str {
        self.search.name()
    }

    /// Top-`k` items for a user code, best first.
    pub fn recommend(
        &self,
        snapshot: &ModelSnapshot,
        user: u32,
        exclude_interacted: bool,
        k: usize,
    ) -> RecResult<Vec<(u32, f32)>> {
        if k == 0 {
            return Err(RecError::InvalidArgument("k must be positive".into()));
        }
        if user as usize >= snapshot.users().len() {
            return Err(RecError::UnknownUser(format!("code {user}")));
        }

        let (history, weights) = snapshot.user_items().row(user as usize);
        let excluded: &[u32] = if exclude_interacted { history } else { &[] };

        let ranked = match snapshot.model() {
            TrainedModel::Als(als) => self.search.search(
                als.user_factors().row(user as usize),
                als.item_factors().view(),
                k,
                excluded,
            ),
            TrainedModel::ItemKnn(knn) => {
                let sim = knn.similarity();
                let mut acc: HashMap<u32, f32> = HashMap::new();
                for (&item, &w) in history.iter().zip(weights) {
                    for (other, s) in sim.row_iter(item as usize) {
                        *acc.entry(other as u32).or_insert(0.0) += w * s;
                    }
                }
                let candidates = acc
                    .into_iter()
                    .filter(|(code, _)| excluded.binary_search(code).is_err())
                    .collect();
                top_k(candidates, k)
            }
        };

        Ok(ranked)
    }

    /// Top-`k` items most similar to an item code, never the item itself.
    pub fn similar_items(
        &self,
        snapshot: &ModelSnapshot,
        item: u32,
        k: usize,
    ) -> RecResult<Vec<(u32, f32)>> {
        if k == 0 {
            return Err(RecError::InvalidArgument("k must be positive".into()));
        }
        if item as usize >= snapshot.items().len() {
            return Err(RecError::UnknownItem(format!("code {item}")));
        }

        let ranked = match snapshot.model() {
            TrainedModel::Als(als) => {
                let normalized = als.normalized_items();
                self.search
                    .search(normalized.row(item as usize), normalized.view(), k, &[item])
            }
            TrainedModel::ItemKnn(knn) => top_k(
                knn.similarity()
                    .row_iter(item as usize)
                    .map(|(code, s)| (code as u32, s))
                    .collect(),
                k,
            ),
        };

        Ok(ranked)
    }

    /// Recommend by raw user identifier, resolving item codes back to identifiers.
    pub fn recommend_for(
        &self,
        snapshot: &ModelSnapshot,
        user_id: &str,
        exclude_interacted: bool,
        k: usize,
    ) -> RecResult<Vec<ScoredItem>> {
        let user = snapshot
            .users()
            .lookup(user_id)
            .ok_or_else(|| RecError::UnknownUser(user_id.to_string()))?;
        let ranked = self.recommend(snapshot, user, exclude_interacted, k)?;
        resolve(snapshot, ranked)
    }

    /// Similar items by raw item identifier.
    pub fn similar_to(
        &self,
        snapshot: &ModelSnapshot,
        item_id: &str,
        k: usize,
    ) -> RecResult<Vec<ScoredItem>> {
        let item = snapshot
            .items()
            .lookup(item_id)
            .ok_or_else(|| RecError::UnknownItem(item_id.to_string()))?;
        let ranked = self.similar_items(snapshot, item, k)?;
        resolve(snapshot, ranked)
    }
}

fn resolve(snapshot: &ModelSnapshot, ranked: Vec<(u32, f32)>) -> RecResult<Vec<ScoredItem>> {
    ranked
        .into_iter()
        .map(|(code, score)| {
            snapshot
                .items()
                .raw_of(code)
                .map(|raw| ScoredItem {
                    item_id: raw.to_string(),
                    score,
                })
                .ok_or_else(|| {
                    RecError::InvalidSnapshot(format!("item code {code} has no identifier"))
                })
        })
        .collect()
}
