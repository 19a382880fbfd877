use crate::config::Config;
use crate::error::{RankingError, Result};
use crate::models::{CandidateSource, RankedItem, SessionContext};
use crate::services::features::FeatureBuilder;
use crate::services::ranking::ModelRegistry;
use crate::services::recall::CandidateGenerator;
use crate::services::rerank::{ReRanker, RuleContext, RuleDecision, ScoredItem};
use crate::store::Snapshot;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Ranked output for one session
#[derive(Debug, Clone, PartialEq)]
pub struct RankingResponse {
    pub session_id: String,
    pub candidate_source: CandidateSource,
    pub model_version: u64,
    pub items: Vec<RankedItem>,
    /// Per-candidate failures (missing metadata); the ranking is partial
    pub failures: Vec<RankingError>,
    pub rule_decisions: Vec<RuleDecision>,
}

/// Recall → features → model → re-rank, over one immutable snapshot
pub struct RankingPipeline {
    snapshot: Arc<Snapshot>,
    generator: CandidateGenerator,
    features: FeatureBuilder,
    registry: Arc<ModelRegistry>,
    reranker: ReRanker,
    fully_watched_threshold: f32,
}

impl RankingPipeline {
    pub fn new(
        snapshot: Arc<Snapshot>,
        config: &Config,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self> {
        let generator = CandidateGenerator::new(Arc::clone(&snapshot), config.recall.clone())?;
        let features = FeatureBuilder::new(Arc::clone(&snapshot), config.features.clone())?;
        Ok(Self {
            snapshot,
            generator,
            features,
            registry,
            reranker: ReRanker::from_config(&config.rerank),
            fully_watched_threshold: config.recall.fully_watched_threshold,
        })
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn rank(&self, session: &SessionContext) -> Result<RankingResponse> {
        let start = Instant::now();
        let user_id = session.user_id.as_str();

        let candidate_set = self.generator.generate(user_id)?;
        let batch = self
            .features
            .build(user_id, &candidate_set.candidates, session)?;

        // one model for the whole request, even if a new version lands meanwhile
        let published = self.registry.current();
        let scores = published.model.predict(&batch.matrix())?;

        let scored: Vec<ScoredItem> = batch
            .vectors
            .iter()
            .zip(scores.iter())
            .map(|(row, score)| ScoredItem {
                item_id: row.item_id.clone(),
                model_score: *score,
                popularity_decay: row.popularity_decay,
            })
            .collect();

        let fully_watched = self
            .snapshot
            .interactions
            .fully_consumed(user_id, self.fully_watched_threshold);
        let ctx = RuleContext {
            session,
            fully_watched: &fully_watched,
            metadata: &self.snapshot.metadata,
        };
        let outcome = self.reranker.rank(scored, &ctx);

        info!(
            session_id = %session.session_id,
            user_id = %user_id,
            source = candidate_set.source.as_str(),
            model_version = published.version,
            candidates = candidate_set.candidates.len(),
            ranked = outcome.items.len(),
            failures = batch.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Session ranked"
        );

        Ok(RankingResponse {
            session_id: session.session_id.clone(),
            candidate_source: candidate_set.source,
            model_version: published.version,
            items: outcome.items,
            failures: batch.failures,
            rule_decisions: outcome.decisions,
        })
    }

    /// Rank sessions in parallel on blocking workers; results keep input order
    pub async fn rank_sessions(
        self: &Arc<Self>,
        sessions: Vec<SessionContext>,
    ) -> Vec<Result<RankingResponse>> {
        let tasks = sessions.into_iter().map(|session| {
            let pipeline = Arc::clone(self);
            tokio::task::spawn_blocking(move || pipeline.rank(&session))
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(RankingError::TaskFailed(format!("ranking task: {}", e)))
                })
            })
            .collect()
    }
}
