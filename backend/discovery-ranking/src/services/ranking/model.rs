//! Ranking Model Adapter
//!
//! Wraps a pluggable [`Ranker`] with input validation: feature layout, group
//! partitioning and degenerate-group handling. Scores are only comparable
//! within one group.

use crate::error::{RankingError, Result};
use crate::models::{FeatureVector, RelevanceGrade, FEATURE_COUNT};
use crate::services::features::feature_matrix;
use ndarray::{Array1, Array2};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Learning-to-rank learner
///
/// `groups` holds consecutive group sizes that partition the rows.
#[cfg_attr(test, mockall::automock)]
pub trait Ranker: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&mut self, features: &Array2<f32>, labels: &[u8], groups: &[usize]) -> Result<()>;

    fn predict(&self, features: &Array2<f32>) -> Result<Array1<f32>>;
}

/// Grouped training rows; each group is one user's query
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub rows: Vec<FeatureVector>,
    pub labels: Vec<RelevanceGrade>,
    pub groups: Vec<usize>,
}

impl TrainingSet {
    pub fn push_group(&mut self, rows: Vec<FeatureVector>, labels: Vec<RelevanceGrade>) {
        self.groups.push(rows.len());
        self.rows.extend(rows);
        self.labels.extend(labels);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row ranges of every group
    pub fn group_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut start = 0;
        self.groups
            .iter()
            .map(|&size| {
                let range = start..start + size;
                start += size;
                range
            })
            .collect()
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitReport {
    pub groups_total: usize,
    pub groups_used: usize,
    pub rows_used: usize,
    /// `DegenerateTrainingGroup` entries for excluded groups
    pub degenerate_groups: Vec<RankingError>,
}

/// Fixed-weight scorer used until a trained model is published
#[derive(Debug, Clone)]
pub struct HeuristicRanker {
    weights: Array1<f32>,
}

impl Default for HeuristicRanker {
    fn default() -> Self {
        // genre, popularity, decay, watch pct, duration, time of day
        Self {
            weights: Array1::from(vec![0.30, 0.10, 0.20, 0.15, 0.15, 0.10]),
        }
    }
}

impl Ranker for HeuristicRanker {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    /// Weights are fixed; training through this ranker is a caller error
    fn fit(&mut self, _features: &Array2<f32>, _labels: &[u8], _groups: &[usize]) -> Result<()> {
        Err(RankingError::InvalidInput(
            "heuristic ranker has fixed weights and cannot be fitted".to_string(),
        ))
    }

    fn predict(&self, features: &Array2<f32>) -> Result<Array1<f32>> {
        Ok(features.dot(&self.weights))
    }
}

/// A fitted ranker; immutable once constructed
pub struct RankingModel {
    ranker: Box<dyn Ranker>,
}

impl std::fmt::Debug for RankingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingModel")
            .field("ranker", &self.ranker.name())
            .finish()
    }
}

impl RankingModel {
    /// Model with heuristic scoring (before any training run)
    pub fn heuristic() -> Self {
        debug!("Using heuristic ranking model");
        Self {
            ranker: Box::new(HeuristicRanker::default()),
        }
    }

    /// Wrap a ranker that is already fitted
    pub fn from_ranker(ranker: Box<dyn Ranker>) -> Self {
        Self { ranker }
    }

    pub fn name(&self) -> &'static str {
        self.ranker.name()
    }

    /// Fit `ranker` on the valid groups of `set`.
    ///
    /// Groups with fewer than two distinct grades are excluded and reported in
    /// the [`FitReport`]; training fails only if no valid group remains.
    pub fn train(mut ranker: Box<dyn Ranker>, set: &TrainingSet) -> Result<(Self, FitReport)> {
        validate_training_set(set)?;

        let mut report = FitReport {
            groups_total: set.groups.len(),
            ..FitReport::default()
        };

        let mut rows: Vec<FeatureVector> = Vec::with_capacity(set.rows.len());
        let mut labels: Vec<u8> = Vec::with_capacity(set.labels.len());
        let mut groups: Vec<usize> = Vec::new();

        for (group_idx, range) in set.group_ranges().into_iter().enumerate() {
            let grades: BTreeSet<RelevanceGrade> =
                set.labels[range.clone()].iter().copied().collect();
            if grades.len() < 2 {
                let user_id = set.rows[range.start].user_id.clone();
                let grade = grades.into_iter().next().unwrap_or_default();
                warn!(
                    group = group_idx,
                    user_id = %user_id,
                    grade = ?grade,
                    "Degenerate training group excluded"
                );
                report.degenerate_groups.push(RankingError::DegenerateTrainingGroup {
                    group: group_idx,
                    user_id,
                    grade,
                });
                continue;
            }

            groups.push(range.len());
            rows.extend_from_slice(&set.rows[range.clone()]);
            labels.extend(set.labels[range].iter().map(|g| g.as_u8()));
        }

        if groups.is_empty() {
            return Err(RankingError::NoValidTrainingGroups);
        }

        let features = feature_matrix(&rows);
        ranker.fit(&features, &labels, &groups)?;

        report.groups_used = groups.len();
        report.rows_used = rows.len();

        info!(
            ranker = ranker.name(),
            groups_total = report.groups_total,
            groups_used = report.groups_used,
            degenerate = report.degenerate_groups.len(),
            rows = report.rows_used,
            "Ranking model trained"
        );

        Ok((Self { ranker }, report))
    }

    /// Score every row of a `rows × FEATURE_COUNT` matrix
    pub fn predict(&self, features: &Array2<f32>) -> Result<Array1<f32>> {
        if features.ncols() != FEATURE_COUNT {
            return Err(RankingError::InvalidInput(format!(
                "Expected {} features, got {}",
                FEATURE_COUNT,
                features.ncols()
            )));
        }
        if features.nrows() == 0 {
            return Ok(Array1::zeros(0));
        }

        let scores = self.ranker.predict(features)?;
        if scores.len() != features.nrows() {
            return Err(RankingError::Inference(format!(
                "{} returned {} scores for {} rows",
                self.ranker.name(),
                scores.len(),
                features.nrows()
            )));
        }
        Ok(scores)
    }
}

fn validate_training_set(set: &TrainingSet) -> Result<()> {
    if set.rows.is_empty() {
        return Err(RankingError::Configuration(
            "empty feature set: training needs at least one row".to_string(),
        ));
    }
    if set.rows.len() != set.labels.len() {
        return Err(RankingError::InvalidInput(format!(
            "{} rows but {} labels",
            set.rows.len(),
            set.labels.len()
        )));
    }
    if set.groups.iter().any(|&size| size == 0) {
        return Err(RankingError::Configuration(
            "group boundaries contain an empty group".to_string(),
        ));
    }
    let covered: usize = set.groups.iter().sum();
    if covered != set.rows.len() {
        return Err(RankingError::Configuration(format!(
            "group sizes cover {} rows, training set has {}",
            covered,
            set.rows.len()
        )));
    }

    for (group_idx, range) in set.group_ranges().into_iter().enumerate() {
        let owner = &set.rows[range.start].user_id;
        if let Some(stray) = set.rows[range].iter().find(|row| &row.user_id != owner) {
            return Err(RankingError::Configuration(format!(
                "group {} spans users {} and {}",
                group_idx, owner, stray.user_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn row(user: &str, item: &str, genre_match: f32) -> FeatureVector {
        FeatureVector {
            user_id: user.to_string(),
            item_id: item.to_string(),
            genre_match,
            popularity: 0.5,
            popularity_decay: 0.5,
            avg_user_watch_pct: 0.5,
            duration_match: 1.0,
            time_of_day_match: 1.0,
        }
    }

    fn two_group_set() -> TrainingSet {
        let mut set = TrainingSet::default();
        set.push_group(
            vec![row("u1", "a", 1.0), row("u1", "b", 0.0)],
            vec![RelevanceGrade::Highly, RelevanceGrade::Irrelevant],
        );
        set.push_group(
            vec![row("u2", "a", 0.2), row("u2", "c", 0.3)],
            vec![RelevanceGrade::Irrelevant, RelevanceGrade::Irrelevant],
        );
        set
    }

    #[test]
    fn test_heuristic_prefers_genre_match() {
        let model = RankingModel::heuristic();
        let features = feature_matrix(&[row("u1", "a", 1.0), row("u1", "b", 0.0)]);
        let scores = model.predict(&features).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_heuristic_cannot_be_trained() {
        let result = RankingModel::train(Box::new(HeuristicRanker::default()), &two_group_set());
        assert!(matches!(result, Err(RankingError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_feature_vector_size() {
        let model = RankingModel::heuristic();
        let features = Array2::from_shape_vec((1, 5), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(matches!(
            model.predict(&features),
            Err(RankingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_degenerate_group_reported_and_skipped() {
        let mut ranker = MockRanker::new();
        ranker.expect_name().return_const("mock");
        ranker
            .expect_fit()
            .withf(|features, labels, groups| {
                features.nrows() == 2 && labels == [3, 0] && groups == [2]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (_, report) = RankingModel::train(Box::new(ranker), &two_group_set()).unwrap();

        assert_eq!(report.groups_total, 2);
        assert_eq!(report.groups_used, 1);
        assert_eq!(report.rows_used, 2);
        assert_eq!(
            report.degenerate_groups,
            vec![RankingError::DegenerateTrainingGroup {
                group: 1,
                user_id: "u2".to_string(),
                grade: RelevanceGrade::Irrelevant,
            }]
        );
    }

    #[test]
    fn test_all_groups_degenerate_fails() {
        let mut set = TrainingSet::default();
        set.push_group(
            vec![row("u1", "a", 1.0), row("u1", "b", 0.0)],
            vec![RelevanceGrade::Relevant, RelevanceGrade::Relevant],
        );
        let mut ranker = MockRanker::new();
        ranker.expect_fit().never();

        assert_eq!(
            RankingModel::train(Box::new(ranker), &set).unwrap_err(),
            RankingError::NoValidTrainingGroups
        );
    }

    #[test]
    fn test_group_spanning_users_rejected() {
        let set = TrainingSet {
            rows: vec![row("u1", "a", 1.0), row("u2", "b", 0.0)],
            labels: vec![RelevanceGrade::Highly, RelevanceGrade::Irrelevant],
            groups: vec![2],
        };
        let ranker = MockRanker::new();
        assert!(matches!(
            RankingModel::train(Box::new(ranker), &set),
            Err(RankingError::Configuration(_))
        ));
    }

    #[test]
    fn test_group_sizes_must_cover_rows() {
        let mut set = two_group_set();
        set.groups = vec![3];
        assert!(matches!(
            RankingModel::train(Box::new(MockRanker::new()), &set),
            Err(RankingError::Configuration(_))
        ));

        set.groups = vec![2, 0, 2];
        assert!(matches!(
            RankingModel::train(Box::new(MockRanker::new()), &set),
            Err(RankingError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_training_set_is_configuration_error() {
        assert!(matches!(
            RankingModel::train(Box::new(MockRanker::new()), &TrainingSet::default()),
            Err(RankingError::Configuration(_))
        ));
    }

    #[test]
    fn test_predict_checks_score_count() {
        let mut ranker = MockRanker::new();
        ranker.expect_name().return_const("short");
        ranker
            .expect_predict()
            .with(always())
            .returning(|_| Ok(Array1::zeros(1)));
        let model = RankingModel::from_ranker(Box::new(ranker));

        let features = feature_matrix(&[row("u1", "a", 1.0), row("u1", "b", 0.0)]);
        assert!(matches!(
            model.predict(&features),
            Err(RankingError::Inference(_))
        ));
    }

    #[test]
    fn test_group_ranges() {
        let set = two_group_set();
        assert_eq!(set.group_ranges(), vec![0..2, 2..4]);
    }
}
