use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the interaction log before encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInteraction {
    pub item: String,
    pub user: String,
    /// Unweighted occurrence count (one view = 1).
    pub count: u32,
}

impl RawInteraction {
    pub fn new(item: impl Into<String>, user: impl Into<String>, count: u32) -> Self {
        Self {
            item: item.into(),
            user: user.into(),
            count,
        }
    }
}

/// Which recommender family a snapshot is trained with.
/// Selected once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Implicit-feedback alternating least squares.
    #[default]
    Als,
    /// Item-item nearest neighbours over L2-normalised count vectors.
    Cosine,
    /// Item-item nearest neighbours over TF-IDF weighted counts.
    TfIdf,
    /// Item-item nearest neighbours over BM25 weighted counts.
    Bm25,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Als => "als",
            ModelKind::Cosine => "cosine",
            ModelKind::TfIdf => "tfidf",
            ModelKind::Bm25 => "bm25",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "als" => Ok(ModelKind::Als),
            "cosine" => Ok(ModelKind::Cosine),
            "tfidf" => Ok(ModelKind::TfIdf),
            "bm25" => Ok(ModelKind::Bm25),
            other => Err(format!("unknown model kind '{other}'")),
        }
    }
}

/// Confidence weighting applied to summed raw counts before factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightingScheme {
    Linear,
    #[default]
    Bm25,
}

/// A scored recommendation resolved back to its raw identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: String,
    pub score: f32,
}

/// Summary of an installed snapshot, exposed on `GET /model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub generation: u64,
    pub kind: ModelKind,
    pub items: usize,
    pub users: usize,
    pub interactions: usize,
    pub trained_at: DateTime<Utc>,
    pub training_ms: u64,
    /// Final ALS loss; absent for neighbourhood models.
    pub loss: Option<f64>,
}
