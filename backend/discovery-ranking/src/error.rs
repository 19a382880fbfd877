use thiserror::Error;

use crate::models::{ItemId, RelevanceGrade, UserId};

/// Errors raised by the re-ranking core.
///
/// Per-candidate (`DataIntegrity`) and per-group (`DegenerateTrainingGroup`)
/// errors are collected next to partial results; the remaining variants abort
/// the request or job that raised them. A cold-start user is not an error and
/// is reported through `CandidateSource` instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RankingError {
    #[error("Data integrity error for item {item_id}: {reason}")]
    DataIntegrity { item_id: ItemId, reason: String },

    #[error("Interaction store is empty")]
    EmptyInteractionStore,

    #[error("Degenerate training group {group} (user {user_id}): every row has grade {grade:?}")]
    DegenerateTrainingGroup {
        group: usize,
        user_id: UserId,
        grade: RelevanceGrade,
    },

    #[error("No valid training groups after excluding degenerate groups")]
    NoValidTrainingGroups,

    #[error("A training job is already running")]
    TrainingInProgress,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl RankingError {
    pub fn missing_metadata(item_id: &str) -> Self {
        RankingError::DataIntegrity {
            item_id: item_id.to_string(),
            reason: "no content metadata row".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RankingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_metadata_message() {
        let err = RankingError::missing_metadata("i42");
        assert_eq!(
            err.to_string(),
            "Data integrity error for item i42: no content metadata row"
        );
    }

    #[test]
    fn test_degenerate_group_message_names_user() {
        let err = RankingError::DegenerateTrainingGroup {
            group: 3,
            user_id: "u7".to_string(),
            grade: RelevanceGrade::Irrelevant,
        };
        assert!(err.to_string().contains("u7"));
        assert!(err.to_string().contains("group 3"));
    }
}
