//! Item-item nearest-neighbour model: keeps, for every item, the `k` items
//! with the largest dot product between their weighted user vectors.

use crate::matrix::CsrMatrix;
use crate::scorer::top_k;
use flrec_core::error::{RecError, RecResult};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ItemNeighbours {
    /// items x items, at most `k` entries per row, never the diagonal.
    similarity: CsrMatrix,
}

impl ItemNeighbours {
    /// Fit from an item x user weight matrix.
    pub fn fit(weights: &CsrMatrix, k: usize) -> RecResult<Self> {
        if weights.rows() == 0 || weights.cols() == 0 {
            return Err(RecError::DegenerateInput(format!(
                "cannot build neighbours for a {}x{} matrix",
                weights.rows(),
                weights.cols()
            )));
        }
        if k == 0 {
            return Err(RecError::InvalidArgument("neighbours must be positive".into()));
        }

        let start = std::time::Instant::now();
        let user_items = weights.transpose();

        let rows: Vec<Vec<(u32, f32)>> = (0..weights.rows())
            .into_par_iter()
            .map(|item| {
                let mut acc: HashMap<u32, f32> = HashMap::new();
                for (user, w) in weights.row_iter(item) {
                    for (other, w_other) in user_items.row_iter(user) {
                        if other != item {
                            *acc.entry(other as u32).or_insert(0.0) += w * w_other;
                        }
                    }
                }
                let candidates: Vec<(u32, f32)> =
                    acc.into_iter().filter(|&(_, s)| s > 0.0).collect();
                let mut best = top_k(candidates, k);
                best.sort_unstable_by_key(|&(code, _)| code);
                best
            })
            .collect();

        let triplets: Vec<(u32, u32, f32)> = rows
            .iter()
            .enumerate()
            .flat_map(|(item, row)| row.iter().map(move |&(other, s)| (item as u32, other, s)))
            .collect();
        let similarity =
            CsrMatrix::from_sorted_triplets(weights.rows(), weights.rows(), &triplets);

        info!(
            items = weights.rows(),
            neighbours = k,
            stored = similarity.nnz(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Item neighbours computed"
        );

        Ok(Self { similarity })
    }

    pub fn similarity(&self) -> &CsrMatrix {
        &self.similarity
    }

    pub fn items(&self) -> usize {
        self.similarity.rows()
    }
}
