mod item_cf_recall;
mod popularity_recall;

use crate::config::RecallConfig;
use crate::error::{RankingError, Result};
use crate::models::{CandidateSet, CandidateSource, ColdStartReason};
use crate::store::Snapshot;
use std::sync::Arc;
use tracing::info;

pub use item_cf_recall::{ItemCFRecallStrategy, ItemCfOutcome, ItemSimilarityIndex};
pub use popularity_recall::PopularityRecallStrategy;

/// Candidate Generator：recall-first 候選集
///
/// Item-CF is the primary strategy; users it cannot serve fall back to the
/// popularity strategy with an explicit [`ColdStartReason`].
pub struct CandidateGenerator {
    snapshot: Arc<Snapshot>,
    index: Arc<ItemSimilarityIndex>,
    item_cf: ItemCFRecallStrategy,
    popularity: PopularityRecallStrategy,
    config: RecallConfig,
}

impl CandidateGenerator {
    /// Builds the similarity index for the snapshot
    pub fn new(snapshot: Arc<Snapshot>, config: RecallConfig) -> Result<Self> {
        config.validate()?;
        let index = Arc::new(ItemSimilarityIndex::build(
            &snapshot.interactions,
            config.min_similarity,
        ));
        Ok(Self::with_index(snapshot, index, config))
    }

    /// Reuse an index already built for this snapshot
    pub fn with_index(
        snapshot: Arc<Snapshot>,
        index: Arc<ItemSimilarityIndex>,
        config: RecallConfig,
    ) -> Self {
        Self {
            snapshot,
            index,
            item_cf: ItemCFRecallStrategy::new(config.clone()),
            popularity: PopularityRecallStrategy::new(config.top_k),
            config,
        }
    }

    pub fn index(&self) -> &Arc<ItemSimilarityIndex> {
        &self.index
    }

    /// 召回候選集
    ///
    /// Fails only when the interaction store is empty; cold users get a
    /// popularity fallback set.
    pub fn generate(&self, user_id: &str) -> Result<CandidateSet> {
        let store = &self.snapshot.interactions;
        if store.is_empty() {
            return Err(RankingError::EmptyInteractionStore);
        }

        let outcome = if store.has_history(user_id) {
            self.item_cf
                .recall(user_id, store, &self.snapshot.metadata, &self.index)
        } else {
            ItemCfOutcome::Cold(ColdStartReason::NoHistory)
        };

        let candidate_set = match outcome {
            ItemCfOutcome::Candidates(candidates) => CandidateSet {
                user_id: user_id.to_string(),
                source: CandidateSource::Collaborative,
                candidates,
            },
            ItemCfOutcome::Cold(reason) => {
                let consumed = store.fully_consumed(user_id, self.config.fully_watched_threshold);
                let candidates =
                    self.popularity
                        .recall(user_id, &self.snapshot.metadata, &consumed);
                info!(
                    user_id = %user_id,
                    reason = ?reason,
                    candidates = candidates.len(),
                    "Cold start: popularity fallback"
                );
                CandidateSet {
                    user_id: user_id.to_string(),
                    source: CandidateSource::PopularityFallback { reason },
                    candidates,
                }
            }
        };

        Ok(candidate_set)
    }
}
