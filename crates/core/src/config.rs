use crate::error::{RecError, RecResult};
use crate::types::{ModelKind, WeightingScheme};
use serde::Deserialize;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `FLREC__`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retrain: RetrainConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Location and layout of the interaction log.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_path")]
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Zero-based column holding the item identifier.
    #[serde(default = "default_item_column")]
    pub item_column: usize,
    /// Zero-based column holding the user identifier.
    #[serde(default = "default_user_column")]
    pub user_column: usize,
    /// Optional column holding an occurrence count. Without it every row counts once.
    #[serde(default)]
    pub count_column: Option<usize>,
    #[serde(default)]
    pub has_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default)]
    pub weighting: WeightingScheme,
    /// BM25 weighting of the matrix fed to ALS.
    #[serde(default)]
    pub bm25: Bm25Config,
    /// BM25 weighting behind the `bm25` item-item model.
    #[serde(default = "default_knn_bm25")]
    pub knn_bm25: Bm25Config,
    /// Embedding dimension F.
    #[serde(default = "default_factors")]
    pub factors: usize,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Ridge term added to every normal-equation diagonal.
    #[serde(default = "default_regularization")]
    pub regularization: f32,
    /// Confidence scale: c = 1 + alpha * weight.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Relative loss improvement below which ALS stops early. 0 disables.
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Neighbours kept per item by the item-item models.
    #[serde(default = "default_neighbours")]
    pub neighbours: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bm25Config {
    #[serde(default = "default_k1")]
    pub k1: f32,
    #[serde(default = "default_b")]
    pub b: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrainConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_count")]
    pub default_count: usize,
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    #[serde(default = "default_exclude_interacted")]
    pub exclude_interacted: bool,
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8888
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_data_path() -> String {
    "data/7day_data".to_string()
}
fn default_delimiter() -> char {
    ','
}
fn default_item_column() -> usize {
    1
}
fn default_user_column() -> usize {
    3
}
fn default_factors() -> usize {
    50
}
fn default_iterations() -> usize {
    15
}
fn default_regularization() -> f32 {
    0.01
}
fn default_alpha() -> f32 {
    1.0
}
fn default_seed() -> u64 {
    42
}
fn default_neighbours() -> usize {
    20
}
fn default_k1() -> f32 {
    100.0
}
fn default_b() -> f32 {
    0.8
}
fn default_knn_bm25() -> Bm25Config {
    Bm25Config { k1: 100.0, b: 0.5 }
}
fn default_interval_secs() -> u64 {
    600
}
fn default_count() -> usize {
    20
}
fn default_max_count() -> usize {
    500
}
fn default_exclude_interacted() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            delimiter: default_delimiter(),
            item_column: default_item_column(),
            user_column: default_user_column(),
            count_column: None,
            has_headers: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            weighting: WeightingScheme::default(),
            bm25: Bm25Config::default(),
            knn_bm25: default_knn_bm25(),
            factors: default_factors(),
            iterations: default_iterations(),
            regularization: default_regularization(),
            alpha: default_alpha(),
            tolerance: 0.0,
            seed: default_seed(),
            neighbours: default_neighbours(),
        }
    }
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
            exclude_interacted: default_exclude_interacted(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> RecResult<()> {
        if self.factors == 0 {
            return Err(RecError::InvalidArgument("model.factors must be positive".into()));
        }
        if self.iterations == 0 {
            return Err(RecError::InvalidArgument("model.iterations must be positive".into()));
        }
        if !(self.regularization > 0.0) {
            return Err(RecError::InvalidArgument(
                "model.regularization must be positive".into(),
            ));
        }
        if !(self.alpha >= 0.0) {
            return Err(RecError::InvalidArgument("model.alpha must be non-negative".into()));
        }
        if !(self.tolerance >= 0.0) {
            return Err(RecError::InvalidArgument("model.tolerance must be non-negative".into()));
        }
        if self.neighbours == 0 {
            return Err(RecError::InvalidArgument("model.neighbours must be positive".into()));
        }
        for (name, bm25) in [("model.bm25", &self.bm25), ("model.knn_bm25", &self.knn_bm25)] {
            if !(bm25.k1 > 0.0) || !(0.0..=1.0).contains(&bm25.b) {
                return Err(RecError::InvalidArgument(format!(
                    "{name} requires k1 > 0 and 0 <= b <= 1"
                )));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then environment variables.
    /// Environment values win over file values.
    pub fn load(path: Option<&str>) -> RecResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("FLREC")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecResult<()> {
        self.model.validate()?;
        if self.retrain.interval_secs == 0 {
            return Err(RecError::InvalidArgument(
                "retrain.interval_secs must be positive".into(),
            ));
        }
        if self.query.default_count == 0 || self.query.default_count > self.query.max_count {
            return Err(RecError::InvalidArgument(
                "query.default_count must be in 1..=query.max_count".into(),
            ));
        }
        if self.data.item_column == self.data.user_column {
            return Err(RecError::InvalidArgument(
                "data.item_column and data.user_column must differ".into(),
            ));
        }
        Ok(())
    }
}
