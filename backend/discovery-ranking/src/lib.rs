pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod synthetic;
pub mod utils;

pub use config::Config;
pub use error::{RankingError, Result};
pub use jobs::TrainingJob;
pub use services::{
    CandidateGenerator, Evaluator, FeatureBuilder, MetricsReport, ModelRegistry, RankingModel,
    RankingPipeline, ReRanker,
};
pub use store::Snapshot;
