//! Offline Evaluation
//!
//! NDCG@k of the trained model against a popularity-only baseline.
//!
//! ```text
//! DCG@k  = Σ_{i=1..k} (2^rel_i − 1) / log2(i + 1)
//! NDCG@k = DCG@k / IDCG@k
//! ```
//!
//! IDCG uses the ideal order of every judged item in the group (grade desc,
//! item_id asc). Lists shorter than k are not padded.

use crate::error::{RankingError, Result};
use crate::models::{FeatureVector, ItemId, RelevanceGrade, UserId};
use crate::services::features::feature_matrix;
use crate::services::ranking::{RankingModel, TrainingSet};
use crate::services::rerank::{ReRanker, ScoredItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// DCG over grades already in ranked order
pub fn dcg_at_k(ranked_grades: &[RelevanceGrade], k: usize) -> f64 {
    ranked_grades
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, grade)| grade.gain() / ((i + 2) as f64).log2())
        .sum()
}

/// Judged items sorted by grade desc, item_id asc
pub fn ideal_order(judgements: &BTreeMap<ItemId, RelevanceGrade>) -> Vec<(&str, RelevanceGrade)> {
    let mut ideal: Vec<(&str, RelevanceGrade)> = judgements
        .iter()
        .map(|(item, grade)| (item.as_str(), *grade))
        .collect();
    // BTreeMap iteration is item_id asc, and the sort is stable
    ideal.sort_by(|a, b| b.1.cmp(&a.1));
    ideal
}

/// NDCG@k of `ranked` against the group's judgements.
///
/// Unjudged items count as grade 0; a group whose grades are all zero scores 0.0.
pub fn ndcg_at_k(
    ranked: &[ItemId],
    judgements: &BTreeMap<ItemId, RelevanceGrade>,
    k: usize,
) -> f64 {
    let ideal: Vec<RelevanceGrade> = ideal_order(judgements).into_iter().map(|(_, g)| g).collect();
    let idcg = dcg_at_k(&ideal, k);
    if idcg <= 0.0 {
        return 0.0;
    }

    let grades: Vec<RelevanceGrade> = ranked
        .iter()
        .map(|item| judgements.get(item).copied().unwrap_or_default())
        .collect();
    dcg_at_k(&grades, k) / idcg
}

/// One user's evaluation query: candidate features plus graded judgements
#[derive(Debug, Clone)]
pub struct EvaluationGroup {
    pub user_id: UserId,
    pub rows: Vec<FeatureVector>,
    pub judgements: BTreeMap<ItemId, RelevanceGrade>,
}

impl EvaluationGroup {
    /// One evaluation group per training group
    pub fn from_training_set(set: &TrainingSet) -> Vec<Self> {
        set.group_ranges()
            .into_iter()
            .filter(|range| !range.is_empty())
            .map(|range| {
                let rows = set.rows[range.clone()].to_vec();
                let judgements = rows
                    .iter()
                    .zip(&set.labels[range.clone()])
                    .map(|(row, grade)| (row.item_id.clone(), *grade))
                    .collect();
                Self {
                    user_id: set.rows[range.start].user_id.clone(),
                    rows,
                    judgements,
                }
            })
            .collect()
    }

    fn has_relevant(&self) -> bool {
        self.judgements
            .values()
            .any(|g| *g > RelevanceGrade::Irrelevant)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsReport {
    pub cutoff: usize,
    pub model_ndcg_at_k: f64,
    pub baseline_ndcg_at_k: f64,
    pub lift_pct: f64,
    pub groups_evaluated: usize,
    /// Groups without any non-zero grade
    pub groups_skipped: usize,
}

pub struct Evaluator {
    cutoff: usize,
}

impl Evaluator {
    pub fn new(cutoff: usize) -> Result<Self> {
        if cutoff == 0 {
            return Err(RankingError::Configuration(
                "evaluation cutoff must be positive".to_string(),
            ));
        }
        Ok(Self { cutoff })
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Model order: model score desc, popularity decay desc, item_id asc
    pub fn model_order(
        &self,
        model: &RankingModel,
        group: &EvaluationGroup,
    ) -> Result<Vec<ItemId>> {
        let scores = model.predict(&feature_matrix(&group.rows))?;
        let scored: Vec<ScoredItem> = group
            .rows
            .iter()
            .zip(scores.iter())
            .map(|(row, score)| ScoredItem {
                item_id: row.item_id.clone(),
                model_score: *score,
                popularity_decay: row.popularity_decay,
            })
            .collect();
        Ok(ReRanker::order(scored)
            .into_iter()
            .map(|item| item.item_id)
            .collect())
    }

    /// Baseline order: popularity desc, item_id asc
    pub fn baseline_order(group: &EvaluationGroup) -> Vec<ItemId> {
        let mut rows: Vec<&FeatureVector> = group.rows.iter().collect();
        rows.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        rows.into_iter().map(|row| row.item_id.clone()).collect()
    }

    pub fn evaluate(
        &self,
        model: &RankingModel,
        groups: &[EvaluationGroup],
    ) -> Result<MetricsReport> {
        let mut model_sum = 0.0;
        let mut baseline_sum = 0.0;
        let mut evaluated = 0usize;
        let mut skipped = 0usize;

        for group in groups {
            if !group.has_relevant() {
                skipped += 1;
                continue;
            }

            let model_order = self.model_order(model, group)?;
            let model_ndcg = ndcg_at_k(&model_order, &group.judgements, self.cutoff);
            let baseline_ndcg =
                ndcg_at_k(&Self::baseline_order(group), &group.judgements, self.cutoff);
            debug!(
                user_id = %group.user_id,
                model_ndcg = model_ndcg,
                baseline_ndcg = baseline_ndcg,
                "Group evaluated"
            );

            model_sum += model_ndcg;
            baseline_sum += baseline_ndcg;
            evaluated += 1;
        }

        let (model_ndcg_at_k, baseline_ndcg_at_k) = if evaluated == 0 {
            (0.0, 0.0)
        } else {
            (model_sum / evaluated as f64, baseline_sum / evaluated as f64)
        };
        let lift_pct =
            (model_ndcg_at_k - baseline_ndcg_at_k) / baseline_ndcg_at_k.max(1e-6) * 100.0;

        let report = MetricsReport {
            cutoff: self.cutoff,
            model_ndcg_at_k,
            baseline_ndcg_at_k,
            lift_pct,
            groups_evaluated: evaluated,
            groups_skipped: skipped,
        };

        info!(
            ranker = model.name(),
            cutoff = self.cutoff,
            model_ndcg = report.model_ndcg_at_k,
            baseline_ndcg = report.baseline_ndcg_at_k,
            lift_pct = report.lift_pct,
            groups_evaluated = evaluated,
            groups_skipped = skipped,
            "Offline evaluation complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelevanceGrade::{Highly, Irrelevant, Marginal, Relevant};
    use crate::services::ranking::MockRanker;

    fn judgements(grades: &[(&str, RelevanceGrade)]) -> BTreeMap<ItemId, RelevanceGrade> {
        grades.iter().map(|(i, g)| (i.to_string(), *g)).collect()
    }

    fn ranked(items: &[&str]) -> Vec<ItemId> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn row(item: &str, genre_match: f32, popularity: f32) -> FeatureVector {
        FeatureVector {
            user_id: "u1".to_string(),
            item_id: item.to_string(),
            genre_match,
            popularity,
            popularity_decay: popularity,
            avg_user_watch_pct: 0.5,
            duration_match: 1.0,
            time_of_day_match: 1.0,
        }
    }

    /// Scores every row by its genre_match column
    fn genre_model() -> RankingModel {
        let mut ranker = MockRanker::new();
        ranker.expect_name().return_const("genre_only");
        ranker
            .expect_predict()
            .returning(|features| Ok(features.column(0).to_owned()));
        RankingModel::from_ranker(Box::new(ranker))
    }

    #[test]
    fn test_ideal_order_is_perfect() {
        let judged = judgements(&[("a", Relevant), ("b", Highly), ("c", Irrelevant)]);
        let ideal: Vec<ItemId> = ideal_order(&judged)
            .into_iter()
            .map(|(i, _)| i.to_string())
            .collect();
        assert_eq!(ideal, ranked(&["b", "a", "c"]));
        assert!((ndcg_at_k(&ideal, &judged, 10) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ideal_order_ties_by_item_id() {
        let judged = judgements(&[("z", Relevant), ("m", Relevant), ("a", Marginal)]);
        let ideal: Vec<&str> = ideal_order(&judged).into_iter().map(|(i, _)| i).collect();
        assert_eq!(ideal, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_all_zero_group_scores_zero() {
        let judged = judgements(&[("a", Irrelevant), ("b", Irrelevant)]);
        assert_eq!(ndcg_at_k(&ranked(&["a", "b"]), &judged, 10), 0.0);
    }

    #[test]
    fn test_short_list_not_padded() {
        // relevant item at rank 2 of 3, cutoff 10
        let judged = judgements(&[("a", Irrelevant), ("b", Highly), ("c", Irrelevant)]);
        let ndcg = ndcg_at_k(&ranked(&["a", "b", "c"]), &judged, 10);
        let expected = (7.0 / 3f64.log2()) / 7.0;
        assert!((ndcg - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unjudged_items_count_as_zero() {
        let judged = judgements(&[("a", Highly)]);
        let ndcg = ndcg_at_k(&ranked(&["x", "a"]), &judged, 10);
        assert!((ndcg - 1.0 / 3f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn test_cutoff_limits_dcg() {
        let judged = judgements(&[("a", Irrelevant), ("b", Highly)]);
        assert_eq!(ndcg_at_k(&ranked(&["a", "b"]), &judged, 1), 0.0);
    }

    #[test]
    fn test_zero_cutoff_rejected() {
        assert!(matches!(
            Evaluator::new(0),
            Err(RankingError::Configuration(_))
        ));
    }

    #[test]
    fn test_evaluate_against_popularity_baseline() {
        let groups = vec![
            EvaluationGroup {
                user_id: "u1".to_string(),
                rows: vec![row("a", 0.9, 0.1), row("b", 0.1, 0.9), row("c", 0.5, 0.5)],
                judgements: judgements(&[("a", Highly), ("b", Irrelevant), ("c", Marginal)]),
            },
            EvaluationGroup {
                user_id: "u2".to_string(),
                rows: vec![row("d", 0.3, 0.3)],
                judgements: judgements(&[("d", Irrelevant)]),
            },
        ];

        let report = Evaluator::new(10)
            .unwrap()
            .evaluate(&genre_model(), &groups)
            .unwrap();

        assert_eq!(report.groups_evaluated, 1);
        assert_eq!(report.groups_skipped, 1);
        assert!((report.model_ndcg_at_k - 1.0).abs() < 1e-12);
        // baseline order b, c, a
        let idcg = 7.0 + 1.0 / 3f64.log2();
        let baseline = (1.0 / 3f64.log2() + 7.0 / 2.0) / idcg;
        assert!((report.baseline_ndcg_at_k - baseline).abs() < 1e-12);
        assert!(report.lift_pct > 0.0);
    }

    #[test]
    fn test_model_ties_resolved_deterministically() {
        let group = EvaluationGroup {
            user_id: "u1".to_string(),
            rows: vec![row("b", 0.5, 0.2), row("a", 0.5, 0.2), row("c", 0.5, 0.4)],
            judgements: judgements(&[("a", Relevant)]),
        };
        let evaluator = Evaluator::new(10).unwrap();
        let order = evaluator.model_order(&genre_model(), &group).unwrap();
        assert_eq!(order, ranked(&["c", "a", "b"]));
    }

    #[test]
    fn test_groups_from_training_set() {
        let mut set = TrainingSet::default();
        set.push_group(
            vec![row("a", 0.1, 0.1), row("b", 0.2, 0.2)],
            vec![Highly, Irrelevant],
        );
        let groups = EvaluationGroup::from_training_set(&set);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].judgements.get("a"), Some(&Highly));
        assert_eq!(groups[0].rows.len(), 2);
    }

    #[test]
    fn test_report_serialises() {
        let report = MetricsReport {
            cutoff: 10,
            model_ndcg_at_k: 0.5,
            baseline_ndcg_at_k: 0.25,
            lift_pct: 100.0,
            groups_evaluated: 4,
            groups_skipped: 1,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["lift_pct"], 100.0);
        assert_eq!(json["groups_skipped"], 1);
    }
}
