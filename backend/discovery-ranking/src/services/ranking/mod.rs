//! Ranking Module
//!
//! Learning-to-rank scoring stage of the discovery pipeline.
//!
//! # Architecture
//! - **Ranker**: pluggable learner seam (`fit` over grouped rows, `predict` per row)
//! - **Model Layer**: `RankingModel` validates groups and feature layout around a ranker
//! - **Registry**: immutable, versioned model artifacts swapped atomically
//!
//! # Workflow
//! 1. Build a grouped training set (one group per user)
//! 2. Fit with a LambdaRank objective, excluding degenerate groups
//! 3. Publish the fitted model to the registry
//! 4. Inference clones the current `Arc` and scores one feature matrix per request
pub mod lambdarank;
pub mod model;
pub mod registry;

pub use lambdarank::{LambdaRankLinear, LambdaRankParams};
pub use model::{FitReport, HeuristicRanker, Ranker, RankingModel, TrainingSet};
pub use registry::{ModelRegistry, PublishedModel, TrainingGuard};

#[cfg(test)]
pub use model::MockRanker;
