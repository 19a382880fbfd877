// ============================================
// LambdaRank (linear scorer)
// ============================================
// Pairwise gradient ascent on ΔNDCG-weighted lambdas over a linear scoring
// function. Accumulation order is fixed (groups in order, pairs by index), so
// identical inputs always produce identical weights.

use super::model::Ranker;
use crate::config::TrainingConfig;
use crate::error::{RankingError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambdaRankParams {
    pub learning_rate: f64,
    pub epochs: usize,
    /// Steepness of the pairwise logistic
    pub sigma: f64,
    /// L2 penalty on the weights
    pub l2: f64,
}

impl Default for LambdaRankParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            epochs: 200,
            sigma: 1.0,
            l2: 1e-4,
        }
    }
}

impl LambdaRankParams {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            learning_rate: f64::from(config.learning_rate),
            epochs: config.epochs,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LambdaRankLinear {
    weights: Array1<f32>,
    params: LambdaRankParams,
}

impl LambdaRankLinear {
    pub fn new(params: LambdaRankParams) -> Self {
        Self {
            weights: Array1::zeros(0),
            params,
        }
    }

    /// Fitted weights, one per feature column (empty before `fit`)
    pub fn weights(&self) -> &Array1<f32> {
        &self.weights
    }
}

impl Default for LambdaRankLinear {
    fn default() -> Self {
        Self::new(LambdaRankParams::default())
    }
}

fn discount(position: usize) -> f64 {
    1.0 / ((position + 2) as f64).log2()
}

fn gain(label: u8) -> f64 {
    f64::from((1u32 << label.min(31)) - 1)
}

/// 0-based rank of every row in the group: score desc, index asc on ties
fn positions(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b)));

    let mut positions = vec![0; scores.len()];
    for (rank, &row) in order.iter().enumerate() {
        positions[row] = rank;
    }
    positions
}

fn ideal_dcg(labels: &[u8]) -> f64 {
    let mut sorted = labels.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
        .iter()
        .enumerate()
        .map(|(pos, &label)| gain(label) * discount(pos))
        .sum()
}

impl Ranker for LambdaRankLinear {
    fn name(&self) -> &'static str {
        "lambdarank_linear"
    }

    fn fit(&mut self, features: &Array2<f32>, labels: &[u8], groups: &[usize]) -> Result<()> {
        let n_rows = features.nrows();
        if labels.len() != n_rows {
            return Err(RankingError::InvalidInput(format!(
                "{} rows but {} labels",
                n_rows,
                labels.len()
            )));
        }
        if groups.iter().sum::<usize>() != n_rows {
            return Err(RankingError::InvalidInput(format!(
                "group sizes cover {} rows, matrix has {}",
                groups.iter().sum::<usize>(),
                n_rows
            )));
        }
        if groups.is_empty() {
            return Err(RankingError::NoValidTrainingGroups);
        }

        let x: Array2<f64> = features.mapv(f64::from);
        let n_features = x.ncols();
        let mut weights: Array1<f64> = Array1::zeros(n_features);
        let n_groups = groups.len() as f64;

        for epoch in 0..self.params.epochs {
            let scores = x.dot(&weights);
            let mut gradient: Array1<f64> = Array1::zeros(n_features);

            let mut start = 0;
            for &size in groups {
                let range = start..start + size;
                start += size;

                let group_labels = &labels[range.clone()];
                let idcg = ideal_dcg(group_labels);
                if idcg <= 0.0 {
                    continue;
                }

                let group_scores: Vec<f64> = scores.slice(ndarray::s![range.clone()]).to_vec();
                let pos = positions(&group_scores);
                let rows = x.slice(ndarray::s![range, ..]);

                for i in 0..size {
                    for j in 0..size {
                        if group_labels[i] <= group_labels[j] {
                            continue;
                        }
                        let delta_ndcg = (gain(group_labels[i]) - gain(group_labels[j])).abs()
                            * (discount(pos[i]) - discount(pos[j])).abs()
                            / idcg;
                        let rho = 1.0
                            / (1.0
                                + (self.params.sigma * (group_scores[i] - group_scores[j])).exp());
                        let lambda = self.params.sigma * rho * delta_ndcg;

                        let xi: ArrayView1<f64> = rows.index_axis(Axis(0), i);
                        let xj: ArrayView1<f64> = rows.index_axis(Axis(0), j);
                        gradient.scaled_add(lambda, &(&xi - &xj));
                    }
                }
            }

            let step = &gradient / n_groups - &weights * self.params.l2;
            weights.scaled_add(self.params.learning_rate, &step);

            if epoch + 1 == self.params.epochs {
                debug!(
                    epochs = self.params.epochs,
                    gradient_norm = gradient.dot(&gradient).sqrt(),
                    "LambdaRank training finished"
                );
            }
        }

        self.weights = weights.mapv(|w| w as f32);
        Ok(())
    }

    fn predict(&self, features: &Array2<f32>) -> Result<Array1<f32>> {
        if features.ncols() != self.weights.len() {
            return Err(RankingError::InvalidInput(format!(
                "model fitted on {} features, got {}",
                self.weights.len(),
                features.ncols()
            )));
        }
        Ok(features.dot(&self.weights))
    }
}
