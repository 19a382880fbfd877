// ============================================
// Training Job (排序模型訓練任務)
// ============================================
//
// Builds one query group per user from a snapshot, fits a LambdaRank model
// and publishes it to the registry.
//
// Workflow:
// 1. Positives: items the user watched past `min_positive_watch_pct`
// 2. Negatives: seeded sample from the rest of the catalogue
// 3. Features through the same FeatureBuilder used at inference, with each
//    row blind to the user's own interactions on that item
// 4. Fit (degenerate groups excluded) and publish a new model version

use crate::config::{FeatureConfig, TrainingConfig};
use crate::error::{RankingError, Result};
use crate::models::{Candidate, ItemId, RelevanceGrade, UserId};
use crate::services::features::FeatureBuilder;
use crate::services::ranking::{
    FitReport, LambdaRankLinear, LambdaRankParams, ModelRegistry, RankingModel, TrainingSet,
};
use crate::store::Snapshot;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output of the training-set builder
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    pub set: TrainingSet,
    /// Users without any positive interaction
    pub users_skipped: usize,
    /// Rows dropped for missing metadata
    pub failures: Vec<RankingError>,
}

#[derive(Clone)]
pub struct TrainingDataBuilder {
    snapshot: Arc<Snapshot>,
    features: FeatureBuilder,
    config: TrainingConfig,
}

impl TrainingDataBuilder {
    pub fn new(
        snapshot: Arc<Snapshot>,
        feature_config: FeatureConfig,
        config: TrainingConfig,
    ) -> Result<Self> {
        config.validate()?;
        let features = FeatureBuilder::new(Arc::clone(&snapshot), feature_config)?;
        Ok(Self {
            snapshot,
            features,
            config,
        })
    }

    fn positives(&self, user_id: &str) -> BTreeSet<ItemId> {
        self.snapshot
            .interactions
            .for_user(user_id)
            .filter(|i| {
                i.signal
                    .watch_pct()
                    .is_some_and(|pct| pct >= self.config.min_positive_watch_pct)
            })
            .map(|i| i.item_id.clone())
            .collect()
    }

    /// Seeded sample without replacement from the catalogue minus `exclude`
    fn sample_negatives(&self, position: usize, exclude: &BTreeSet<ItemId>) -> Vec<ItemId> {
        let pool: Vec<&str> = self
            .snapshot
            .metadata
            .item_ids()
            .into_iter()
            .filter(|item| !exclude.contains(*item))
            .collect();

        let seed = self.config.seed ^ (position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(seed);
        pool.choose_multiple(&mut rng, self.config.negatives_per_user)
            .map(|item| item.to_string())
            .collect()
    }

    /// One group per user with at least one positive, in `user_ids` order
    pub fn build(&self, user_ids: &[UserId]) -> Result<TrainingData> {
        let mut data = TrainingData::default();

        for (position, user_id) in user_ids.iter().enumerate() {
            let positives = self.positives(user_id);
            if positives.is_empty() {
                debug!(user_id = %user_id, "No positive interactions, user skipped");
                data.users_skipped += 1;
                continue;
            }

            let negatives = self.sample_negatives(position, &positives);
            let items: BTreeSet<ItemId> = positives.into_iter().chain(negatives).collect();
            let candidates: Vec<Candidate> = items
                .into_iter()
                .map(|item_id| Candidate {
                    user_id: user_id.clone(),
                    item_id,
                    recall_score: 0.0,
                })
                .collect();

            let session = self.snapshot.context_or_neutral(user_id);
            let batch = self
                .features
                .build_held_out(user_id, &candidates, &session)?;
            data.failures.extend(batch.failures);
            if batch.vectors.is_empty() {
                warn!(user_id = %user_id, "No buildable training rows for user");
                data.users_skipped += 1;
                continue;
            }

            let labels: Vec<RelevanceGrade> = batch
                .vectors
                .iter()
                .map(|row| self.snapshot.interactions.grade_for(user_id, &row.item_id))
                .collect();
            data.set.push_group(batch.vectors, labels);
        }

        info!(
            users = user_ids.len(),
            groups = data.set.groups.len(),
            rows = data.set.rows.len(),
            users_skipped = data.users_skipped,
            failures = data.failures.len(),
            "Training set built"
        );

        Ok(data)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub version: u64,
    pub report: FitReport,
    pub users_skipped: usize,
    pub failures: Vec<RankingError>,
}

/// Single-flight training: a `run` started while any job is training into the
/// same registry fails with `TrainingInProgress`.
pub struct TrainingJob {
    builder: TrainingDataBuilder,
    registry: Arc<ModelRegistry>,
    params: LambdaRankParams,
}

impl TrainingJob {
    pub fn new(
        snapshot: Arc<Snapshot>,
        feature_config: FeatureConfig,
        config: TrainingConfig,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self> {
        let params = LambdaRankParams::from_config(&config);
        Ok(Self {
            builder: TrainingDataBuilder::new(snapshot, feature_config, config)?,
            registry,
            params,
        })
    }

    pub fn builder(&self) -> &TrainingDataBuilder {
        &self.builder
    }

    pub async fn run(&self, user_ids: &[UserId]) -> Result<TrainingOutcome> {
        let _guard = self.registry.begin_training()?;

        let start = Instant::now();
        info!(users = user_ids.len(), "Training job started");

        let builder = self.builder.clone();
        let params = self.params;
        let user_ids = user_ids.to_vec();
        let (model, report, data) = tokio::task::spawn_blocking(move || {
            let data = builder.build(&user_ids)?;
            let (model, report) =
                RankingModel::train(Box::new(LambdaRankLinear::new(params)), &data.set)?;
            Ok::<_, RankingError>((model, report, data))
        })
        .await
        .map_err(|e| RankingError::TaskFailed(format!("training task: {}", e)))??;

        let version = self.registry.publish(model);

        info!(
            version = version,
            groups_used = report.groups_used,
            degenerate = report.degenerate_groups.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training job finished"
        );

        Ok(TrainingOutcome {
            version,
            report,
            users_skipped: data.users_skipped,
            failures: data.failures,
        })
    }
}
