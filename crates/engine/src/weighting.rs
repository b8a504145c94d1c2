//! Confidence weighting of summed interaction counts.
//!
//! Every scheme keeps the sparsity pattern of its input: a stored count of
//! `n >= 1` always maps to a strictly positive weight, so "interacted" means
//! the same thing before and after weighting.

use crate::matrix::CsrMatrix;
use flrec_core::types::WeightingScheme;

/// BM25 saturation and length-normalisation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 100.0, b: 0.8 }
    }
}

/// Smoothed inverse document frequency: `ln((N - n + 0.5) / (n + 0.5) + 1)`.
///
/// Always positive, strictly decreasing in `n` for a fixed `N`.
pub fn bm25_idf(total: usize, df: usize) -> f32 {
    let total = total as f64;
    let df = df as f64;
    (((total - df + 0.5) / (df + 0.5)) + 1.0).ln() as f32
}

/// Saturating term weight `count * (k1 + 1) / (k1 * norm + count) * idf`.
pub fn bm25_term(count: f32, idf: f32, length_norm: f32, k1: f32) -> f32 {
    count * (k1 + 1.0) / (k1 * length_norm + count) * idf
}

/// Apply `scheme` to an item x user count matrix.
pub fn apply(scheme: WeightingScheme, params: Bm25Params, counts: &CsrMatrix) -> CsrMatrix {
    match scheme {
        WeightingScheme::Linear => counts.clone(),
        WeightingScheme::Bm25 => bm25(counts, params),
    }
}

/// BM25 over an item x user count matrix. Items play the role of terms
/// (idf downweights ubiquitous items) and users the role of documents
/// (length normalisation by each user's total count).
pub fn bm25(counts: &CsrMatrix, params: Bm25Params) -> CsrMatrix {
    let users = counts.cols();
    let idf: Vec<f32> = (0..counts.rows())
        .map(|item| bm25_idf(users, counts.row_nnz(item)))
        .collect();

    let lengths = counts.col_sums();
    let avg_len = if users > 0 {
        lengths.iter().sum::<f32>() / users as f32
    } else {
        0.0
    };
    let norms: Vec<f32> = lengths
        .iter()
        .map(|&len| {
            if avg_len > 0.0 {
                (1.0 - params.b) + params.b * len / avg_len
            } else {
                1.0
            }
        })
        .collect();

    counts.map_values(|item, user, count| bm25_term(count, idf[item], norms[user], params.k1))
}

/// TF-IDF with damped term frequency: `sqrt(count) * idf(user)`, where the
/// idf is taken over items so that users who touch everything contribute
/// little to item-item similarity.
pub fn tfidf(counts: &CsrMatrix) -> CsrMatrix {
    let items = counts.rows();
    let transposed = counts.transpose();
    let idf: Vec<f32> = (0..transposed.rows())
        .map(|user| bm25_idf(items, transposed.row_nnz(user)))
        .collect();

    counts.map_values(|_, user, count| count.sqrt() * idf[user])
}

/// Scale each row to unit L2 norm. All-zero rows stay zero.
pub fn l2_normalize_rows(m: &CsrMatrix) -> CsrMatrix {
    let norms: Vec<f32> = (0..m.rows())
        .map(|r| m.row(r).1.iter().map(|v| v * v).sum::<f32>().sqrt())
        .collect();
    m.map_values(|r, _, v| if norms[r] > 0.0 { v / norms[r] } else { 0.0 })
}
