use super::model::RankingModel;
use crate::error::{RankingError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

/// Held by the one training run allowed to publish into a registry
pub type TrainingGuard<'a> = MutexGuard<'a, ()>;

/// An immutable, versioned model artifact
#[derive(Debug)]
pub struct PublishedModel {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub model: RankingModel,
}

/// Holds the model currently used for inference.
///
/// Readers clone the `Arc` and keep scoring with that artifact even if a newer
/// one is published meanwhile; a request never observes a half-written model.
/// At most one training run per registry is active at a time, whichever job
/// object started it.
#[derive(Debug)]
pub struct ModelRegistry {
    current: RwLock<Arc<PublishedModel>>,
    training: Mutex<()>,
}

impl ModelRegistry {
    /// Registry whose version 0 is `model`
    pub fn new(model: RankingModel) -> Self {
        Self {
            current: RwLock::new(Arc::new(PublishedModel {
                version: 0,
                published_at: Utc::now(),
                model,
            })),
            training: Mutex::new(()),
        }
    }

    pub fn with_heuristic() -> Self {
        Self::new(RankingModel::heuristic())
    }

    pub fn current(&self) -> Arc<PublishedModel> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Claim the training slot; fails with `TrainingInProgress` while
    /// another run holds it
    pub fn begin_training(&self) -> Result<TrainingGuard<'_>> {
        self.training
            .try_lock()
            .map_err(|_| RankingError::TrainingInProgress)
    }

    /// Swap in a newly fitted model and return its version
    pub fn publish(&self, model: RankingModel) -> u64 {
        let mut current = self.current.write();
        let version = current.version + 1;
        let ranker = model.name();
        *current = Arc::new(PublishedModel {
            version,
            published_at: Utc::now(),
            model,
        });
        drop(current);

        info!(version = version, ranker = ranker, "Ranking model published");
        version
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_heuristic()
    }
}
