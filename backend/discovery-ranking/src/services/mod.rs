pub mod evaluation;
pub mod features;
pub mod pipeline;
pub mod ranking;
pub mod recall;
pub mod rerank;

pub use evaluation::{EvaluationGroup, Evaluator, MetricsReport};
pub use features::{FeatureBatch, FeatureBuilder};
pub use pipeline::{RankingPipeline, RankingResponse};
pub use ranking::{ModelRegistry, RankingModel};
pub use recall::CandidateGenerator;
pub use rerank::ReRanker;
