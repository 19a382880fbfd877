use crate::error::{RankingError, Result};
use crate::services::rerank::FullyWatchedAction;
use crate::synthetic::SyntheticConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub recall: RecallConfig,
    pub features: FeatureConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub rerank: RerankConfig,
    pub synthetic: SyntheticConfig,
}

/// Item-based CF candidate generation (`RECALL_*`)
#[derive(Debug, Clone, Deserialize)]
pub struct RecallConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_seed_items")]
    pub max_seed_items: usize,
    /// Minimum signal strength for an item to seed recall
    #[serde(default = "default_positive_threshold")]
    pub positive_threshold: f32,
    #[serde(default = "default_fully_watched_threshold")]
    pub fully_watched_threshold: f32,
    /// Similarities at or below this value are dropped from the index
    #[serde(default)]
    pub min_similarity: f64,
}

/// Feature computation (`FEATURES_*`)
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_decay_lambda")]
    pub decay_lambda: f32,
    #[serde(default = "default_session_affinity_weight")]
    pub session_affinity_weight: f32,
    #[serde(default = "default_duration_band_minutes")]
    pub duration_band_minutes: f32,
    #[serde(default = "default_long_form_minutes")]
    pub long_form_minutes: f32,
}

/// Training set construction and learner settings (`TRAINING_*`)
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_min_positive_watch_pct")]
    pub min_positive_watch_pct: f32,
    #[serde(default = "default_negatives_per_user")]
    pub negatives_per_user: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

/// Offline evaluation (`EVALUATION_*`)
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_cutoff")]
    pub cutoff: usize,
    /// Share of users held out from training
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f32,
}

/// Post-scoring business rules (`RERANK_*`)
#[derive(Debug, Clone, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_true")]
    pub enforce_maturity: bool,
    #[serde(default = "default_fully_watched_action")]
    pub fully_watched_action: FullyWatchedAction,
}

fn default_top_k() -> usize {
    100
}
fn default_max_seed_items() -> usize {
    20
}
fn default_positive_threshold() -> f32 {
    0.5
}
fn default_fully_watched_threshold() -> f32 {
    0.9
}
fn default_decay_lambda() -> f32 {
    0.01
}
fn default_session_affinity_weight() -> f32 {
    0.3
}
fn default_duration_band_minutes() -> f32 {
    30.0
}
fn default_long_form_minutes() -> f32 {
    120.0
}
fn default_min_positive_watch_pct() -> f32 {
    0.5
}
fn default_negatives_per_user() -> usize {
    20
}
fn default_seed() -> u64 {
    42
}
fn default_learning_rate() -> f32 {
    0.05
}
fn default_epochs() -> usize {
    200
}
fn default_cutoff() -> usize {
    10
}
fn default_holdout_fraction() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}
fn default_fully_watched_action() -> FullyWatchedAction {
    FullyWatchedAction::Remove
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_seed_items: default_max_seed_items(),
            positive_threshold: default_positive_threshold(),
            fully_watched_threshold: default_fully_watched_threshold(),
            min_similarity: 0.0,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            decay_lambda: default_decay_lambda(),
            session_affinity_weight: default_session_affinity_weight(),
            duration_band_minutes: default_duration_band_minutes(),
            long_form_minutes: default_long_form_minutes(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_positive_watch_pct: default_min_positive_watch_pct(),
            negatives_per_user: default_negatives_per_user(),
            seed: default_seed(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            holdout_fraction: default_holdout_fraction(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enforce_maturity: true,
            fully_watched_action: default_fully_watched_action(),
        }
    }
}

impl Config {
    /// Load from `.env` (if present) and prefixed environment variables,
    /// then validate.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            recall: load_prefixed("RECALL_")?,
            features: load_prefixed("FEATURES_")?,
            training: load_prefixed("TRAINING_")?,
            evaluation: load_prefixed("EVALUATION_")?,
            rerank: load_prefixed("RERANK_")?,
            synthetic: load_prefixed("SYNTHETIC_")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.recall.validate()?;
        self.features.validate()?;
        self.training.validate()?;
        self.evaluation.validate()?;
        self.synthetic.validate()
    }
}

fn load_prefixed<T: serde::de::DeserializeOwned>(prefix: &str) -> Result<T> {
    envy::prefixed(prefix)
        .from_env::<T>()
        .map_err(|e| RankingError::Configuration(format!("{}*: {}", prefix, e)))
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RankingError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

impl RecallConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RankingError::Configuration(
                "recall top_k must be positive".to_string(),
            ));
        }
        if self.max_seed_items == 0 {
            return Err(RankingError::Configuration(
                "recall max_seed_items must be positive".to_string(),
            ));
        }
        check_unit_interval("recall positive_threshold", self.positive_threshold)?;
        check_unit_interval(
            "recall fully_watched_threshold",
            self.fully_watched_threshold,
        )
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.decay_lambda >= 0.0) {
            return Err(RankingError::Configuration(format!(
                "features decay_lambda must be non-negative, got {}",
                self.decay_lambda
            )));
        }
        if !(self.duration_band_minutes > 0.0) {
            return Err(RankingError::Configuration(format!(
                "features duration_band_minutes must be positive, got {}",
                self.duration_band_minutes
            )));
        }
        check_unit_interval(
            "features session_affinity_weight",
            self.session_affinity_weight,
        )
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(RankingError::Configuration(
                "training epochs must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(RankingError::Configuration(format!(
                "training learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        check_unit_interval(
            "training min_positive_watch_pct",
            self.min_positive_watch_pct,
        )
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cutoff == 0 {
            return Err(RankingError::Configuration(
                "evaluation cutoff must be positive".to_string(),
            ));
        }
        check_unit_interval("evaluation holdout_fraction", self.holdout_fraction)
    }
}
