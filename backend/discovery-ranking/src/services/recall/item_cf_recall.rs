use crate::config::RecallConfig;
use crate::models::{Candidate, ColdStartReason, ItemId};
use crate::store::{InteractionStore, MetadataStore};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Item-based Collaborative Filtering
///
/// Algorithm:
/// 1. Build an item-item cosine similarity index over user signal vectors
/// 2. Take the user's recent positively-signalled items as seeds
/// 3. Aggregate similarity-weighted votes for every neighbour the user has
///    never interacted with
///
/// Seed votes decay with recency position: `max(1 - 0.05 * idx, 0.5)`.
pub struct ItemCFRecallStrategy {
    config: RecallConfig,
}

/// Outcome of collaborative recall before the cold-start policy is applied
#[derive(Debug, Clone, PartialEq)]
pub enum ItemCfOutcome {
    Candidates(Vec<Candidate>),
    Cold(ColdStartReason),
}

/// Pre-computed cosine similarity between items
///
/// Built once per snapshot and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ItemSimilarityIndex {
    neighbours: HashMap<ItemId, Vec<(ItemId, f64)>>,
}

impl ItemSimilarityIndex {
    /// `sim(i, j) = Σ_u r_ui·r_uj / (‖r_i‖·‖r_j‖)`
    pub fn build(store: &InteractionStore, min_similarity: f64) -> Self {
        let mut norms: BTreeMap<ItemId, f64> = BTreeMap::new();
        let mut dots: BTreeMap<(ItemId, ItemId), f64> = BTreeMap::new();

        // Users and items iterate in sorted order so float accumulation is
        // reproducible run to run.
        for user_id in store.users() {
            let strengths = store.user_item_strengths(user_id);
            let mut items: Vec<(&ItemId, f64)> = strengths
                .iter()
                .map(|(item, s)| (item, f64::from(*s)))
                .filter(|(_, s)| *s > 0.0)
                .collect();
            items.sort_by(|a, b| a.0.cmp(b.0));

            for (i, (item_a, r_a)) in items.iter().enumerate() {
                *norms.entry((*item_a).clone()).or_insert(0.0) += r_a * r_a;
                for (item_b, r_b) in items.iter().skip(i + 1) {
                    *dots
                        .entry(((*item_a).clone(), (*item_b).clone()))
                        .or_insert(0.0) += r_a * r_b;
                }
            }
        }

        let mut neighbours: HashMap<ItemId, Vec<(ItemId, f64)>> = HashMap::new();
        for ((item_a, item_b), dot) in dots {
            let denom = norms.get(&item_a).copied().unwrap_or(0.0).sqrt()
                * norms.get(&item_b).copied().unwrap_or(0.0).sqrt();
            if denom <= 0.0 {
                continue;
            }
            let similarity = dot / denom;
            if similarity <= min_similarity {
                continue;
            }
            neighbours
                .entry(item_a.clone())
                .or_default()
                .push((item_b.clone(), similarity));
            neighbours
                .entry(item_b)
                .or_default()
                .push((item_a, similarity));
        }

        for list in neighbours.values_mut() {
            list.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        }

        debug!(items = neighbours.len(), "Item similarity index built");

        Self { neighbours }
    }

    /// Neighbours sorted by similarity desc, item_id asc
    pub fn neighbours(&self, item_id: &str) -> &[(ItemId, f64)] {
        self.neighbours
            .get(item_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        self.neighbours(a)
            .iter()
            .find(|(item, _)| item == b)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }
}

impl ItemCFRecallStrategy {
    pub fn new(config: RecallConfig) -> Self {
        Self { config }
    }

    pub fn recall(
        &self,
        user_id: &str,
        store: &InteractionStore,
        metadata: &MetadataStore,
        index: &ItemSimilarityIndex,
    ) -> ItemCfOutcome {
        let strengths = store.user_item_strengths(user_id);

        // Step 1: seeds = recent positive items
        let seeds: Vec<(ItemId, f64)> = store
            .recent_items(user_id)
            .into_iter()
            .filter_map(|(item, _)| {
                let strength = strengths.get(&item).copied().unwrap_or(0.0);
                (strength >= self.config.positive_threshold).then(|| (item, f64::from(strength)))
            })
            .take(self.config.max_seed_items)
            .collect();

        if seeds.is_empty() {
            info!(
                user_id = %user_id,
                "Item-CF recall: no positive seed items"
            );
            return ItemCfOutcome::Cold(ColdStartReason::NoPositiveSignals);
        }

        // Step 2: aggregate votes for unseen neighbours only
        let mut votes: HashMap<&str, f64> = HashMap::new();
        for (seed_idx, (seed_item, seed_strength)) in seeds.iter().enumerate() {
            let recency_decay = (1.0 - seed_idx as f64 * 0.05).max(0.5);
            for (neighbour, similarity) in index.neighbours(seed_item) {
                if strengths.contains_key(neighbour) {
                    continue;
                }
                *votes.entry(neighbour.as_str()).or_insert(0.0) +=
                    similarity * seed_strength * recency_decay;
            }
        }

        if votes.is_empty() {
            info!(
                user_id = %user_id,
                seeds = seeds.len(),
                "Item-CF recall: seeds have no unseen neighbours"
            );
            return ItemCfOutcome::Cold(ColdStartReason::NoNeighbours);
        }

        // Step 3: order by score, popularity, item_id
        let mut scored: Vec<(&str, f64, f32)> = votes
            .into_iter()
            .map(|(item, score)| (item, score, metadata.popularity(item)))
            .collect();
        scored.sort_by(|a, b| compare_recall(a.1, a.2, a.0, b.1, b.2, b.0));

        let candidates: Vec<Candidate> = scored
            .into_iter()
            .take(self.config.top_k)
            .map(|(item, score, _)| Candidate {
                user_id: user_id.to_string(),
                item_id: item.to_string(),
                recall_score: score as f32,
            })
            .collect();

        info!(
            user_id = %user_id,
            seeds = seeds.len(),
            candidates = candidates.len(),
            "Item-CF recall completed"
        );

        ItemCfOutcome::Candidates(candidates)
    }
}

/// Recall score desc, popularity desc, item_id asc
fn compare_recall(
    score_a: f64,
    pop_a: f32,
    item_a: &str,
    score_b: f64,
    pop_b: f32,
    item_b: &str,
) -> Ordering {
    score_b
        .total_cmp(&score_a)
        .then_with(|| pop_b.total_cmp(&pop_a))
        .then_with(|| item_a.cmp(item_b))
}
