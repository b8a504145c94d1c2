//! Sparse interaction storage and the builder that turns raw log rows into it.

use crate::vocab::Vocabulary;
use flrec_core::types::RawInteraction;
use tracing::debug;

/// Compressed sparse row matrix with sorted column indices in every row.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl CsrMatrix {
    /// An all-zero matrix of the given shape.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            indptr: vec![0; rows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from `(row, col, value)` triplets already sorted by `(row, col)`
    /// with no duplicate coordinates.
    pub fn from_sorted_triplets(rows: usize, cols: usize, triplets: &[(u32, u32, f32)]) -> Self {
        let mut indptr = vec![0usize; rows + 1];
        let mut indices = Vec::with_capacity(triplets.len());
        let mut data = Vec::with_capacity(triplets.len());

        for &(r, c, v) in triplets {
            debug_assert!((r as usize) < rows && (c as usize) < cols);
            indptr[r as usize + 1] += 1;
            indices.push(c);
            data.push(v);
        }
        for r in 0..rows {
            indptr[r + 1] += indptr[r];
        }

        Self {
            rows,
            cols,
            indptr,
            indices,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices and values stored for one row.
    pub fn row(&self, r: usize) -> (&[u32], &[f32]) {
        let (start, end) = (self.indptr[r], self.indptr[r + 1]);
        (&self.indices[start..end], &self.data[start..end])
    }

    pub fn row_iter(&self, r: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (cols, vals) = self.row(r);
        cols.iter().map(|&c| c as usize).zip(vals.iter().copied())
    }

    pub fn row_nnz(&self, r: usize) -> usize {
        self.indptr[r + 1] - self.indptr[r]
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        let (cols, vals) = self.row(r);
        match cols.binary_search(&(c as u32)) {
            Ok(pos) => vals[pos],
            Err(_) => 0.0,
        }
    }

    /// Transpose, keeping column indices sorted in every output row.
    pub fn transpose(&self) -> CsrMatrix {
        let mut indptr = vec![0usize; self.cols + 1];
        for &c in &self.indices {
            indptr[c as usize + 1] += 1;
        }
        for c in 0..self.cols {
            indptr[c + 1] += indptr[c];
        }

        let mut next = indptr.clone();
        let mut indices = vec![0u32; self.nnz()];
        let mut data = vec![0f32; self.nnz()];
        for r in 0..self.rows {
            for (c, v) in self.row_iter(r) {
                let dst = next[c];
                indices[dst] = r as u32;
                data[dst] = v;
                next[c] += 1;
            }
        }

        CsrMatrix {
            rows: self.cols,
            cols: self.rows,
            indptr,
            indices,
            data,
        }
    }

    /// Same sparsity pattern with every stored value replaced by `f(row, col, value)`.
    pub fn map_values(&self, f: impl Fn(usize, usize, f32) -> f32) -> CsrMatrix {
        let mut data = Vec::with_capacity(self.nnz());
        for r in 0..self.rows {
            for (c, v) in self.row_iter(r) {
                data.push(f(r, c, v));
            }
        }
        CsrMatrix {
            rows: self.rows,
            cols: self.cols,
            indptr: self.indptr.clone(),
            indices: self.indices.clone(),
            data,
        }
    }

    /// Sum of each column.
    pub fn col_sums(&self) -> Vec<f32> {
        let mut sums = vec![0f32; self.cols];
        for (&c, &v) in self.indices.iter().zip(&self.data) {
            sums[c as usize] += v;
        }
        sums
    }
}

/// Output of the builder: both vocabularies plus the summed raw counts
/// as an item x user matrix.
#[derive(Debug, Clone)]
pub struct InteractionData {
    pub items: Vocabulary,
    pub users: Vocabulary,
    pub counts: CsrMatrix,
}

/// Accumulates interaction records and produces the summed count matrix.
/// Duplicate `(item, user)` pairs are summed before any weighting runs.
#[derive(Debug, Default)]
pub struct InteractionMatrixBuilder {
    items: Vocabulary,
    users: Vocabulary,
    entries: Vec<(u32, u32, u32)>,
}

impl InteractionMatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode and record one raw log row. Zero counts still reserve codes.
    pub fn push(&mut self, record: &RawInteraction) {
        let item = self.items.code_of(&record.item);
        let user = self.users.code_of(&record.user);
        if record.count > 0 {
            self.entries.push((item, user, record.count));
        }
    }

    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a RawInteraction>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn build(mut self) -> InteractionData {
        let raw_rows = self.entries.len();
        self.entries.sort_unstable_by_key(|&(i, u, _)| (i, u));

        let mut merged: Vec<(u32, u32, u64)> = Vec::with_capacity(self.entries.len());
        for &(i, u, count) in &self.entries {
            if let Some(last) = merged.last_mut() {
                if last.0 == i && last.1 == u {
                    last.2 += count as u64;
                    continue;
                }
            }
            merged.push((i, u, count as u64));
        }
        let triplets: Vec<(u32, u32, f32)> = merged
            .into_iter()
            .map(|(i, u, sum)| (i, u, sum as f32))
            .collect();

        let counts =
            CsrMatrix::from_sorted_triplets(self.items.len(), self.users.len(), &triplets);

        debug!(
            raw_rows = raw_rows,
            items = self.items.len(),
            users = self.users.len(),
            nnz = counts.nnz(),
            "Interaction matrix built"
        );

        InteractionData {
            items: self.items,
            users: self.users,
            counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InteractionData {
        let mut builder = InteractionMatrixBuilder::new();
        builder.extend(&[
            RawInteraction::new("a", "u1", 3),
            RawInteraction::new("b", "u1", 1),
            RawInteraction::new("a", "u2", 5),
            RawInteraction::new("a", "u1", 2),
        ]);
        builder.build()
    }

    #[test]
    fn test_duplicates_are_summed() {
        let data = sample();
        assert_eq!(data.counts.rows(), 2);
        assert_eq!(data.counts.cols(), 2);
        assert_eq!(data.counts.nnz(), 3);

        let a = data.items.lookup("a").unwrap() as usize;
        let u1 = data.users.lookup("u1").unwrap() as usize;
        assert_eq!(data.counts.get(a, u1), 5.0);
    }

    #[test]
    fn test_transpose_keeps_values_and_sorted_columns() {
        let data = sample();
        let t = data.counts.transpose();
        assert_eq!(t.rows(), data.counts.cols());
        assert_eq!(t.nnz(), data.counts.nnz());
        for r in 0..data.counts.rows() {
            for (c, v) in data.counts.row_iter(r) {
                assert_eq!(t.get(c, r), v);
            }
        }
        for r in 0..t.rows() {
            let (cols, _) = t.row(r);
            assert!(cols.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_zero_count_records_keep_their_codes() {
        let mut builder = InteractionMatrixBuilder::new();
        builder.push(&RawInteraction::new("a", "u1", 1));
        builder.push(&RawInteraction::new("silent", "lurker", 0));
        let data = builder.build();

        assert_eq!(data.items.len(), 2);
        assert_eq!(data.users.len(), 2);
        let silent = data.items.lookup("silent").unwrap() as usize;
        assert_eq!(data.counts.row_nnz(silent), 0);
    }

    #[test]
    fn test_sums_and_empty_rows() {
        let m = CsrMatrix::from_sorted_triplets(3, 2, &[(0, 0, 1.0), (0, 1, 2.0), (2, 1, 4.0)]);
        assert_eq!(m.col_sums(), vec![1.0, 6.0]);
        assert_eq!(m.row_nnz(1), 0);
        assert_eq!(CsrMatrix::empty(2, 2).nnz(), 0);
    }
}
