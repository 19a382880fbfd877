use crate::models::Candidate;
use crate::store::MetadataStore;
use crate::utils::{min_max, normalize_score};
use std::collections::HashSet;
use tracing::warn;

/// Popularity Recall Strategy - 冷啟動召回
/// Most popular catalogue items, used when collaborative recall has nothing
/// to offer for a user.
pub struct PopularityRecallStrategy {
    top_k: usize,
}

impl PopularityRecallStrategy {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Popularity desc, item_id asc; `recall_score` is popularity normalised
    /// over the whole catalogue.
    pub fn recall(
        &self,
        user_id: &str,
        metadata: &MetadataStore,
        exclude: &HashSet<String>,
    ) -> Vec<Candidate> {
        let popularities: Vec<f32> = metadata.iter().map(|m| m.popularity).collect();
        let Some((min, max)) = min_max(&popularities) else {
            warn!("Popularity recall: metadata store is empty");
            return Vec::new();
        };

        let mut items: Vec<(&str, f32)> = metadata
            .iter()
            .filter(|m| !exclude.contains(&m.item_id))
            .map(|m| (m.item_id.as_str(), m.popularity))
            .collect();
        items.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        items
            .into_iter()
            .take(self.top_k)
            .map(|(item_id, popularity)| Candidate {
                user_id: user_id.to_string(),
                item_id: item_id.to_string(),
                recall_score: normalize_score(popularity, min, max),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentMetadata;
    use chrono::{TimeZone, Utc};

    fn metadata(item: &str, popularity: f32) -> ContentMetadata {
        ContentMetadata {
            item_id: item.to_string(),
            genres: vec!["comedy".to_string()],
            duration_minutes: 30.0,
            release_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            popularity,
            maturity: Default::default(),
        }
    }

    #[test]
    fn test_popularity_order_and_exclusion() {
        let store = MetadataStore::from_rows(vec![
            metadata("b", 50.0),
            metadata("a", 50.0),
            metadata("c", 100.0),
            metadata("d", 0.0),
        ]);
        let exclude: HashSet<String> = ["c".to_string()].into_iter().collect();

        let candidates = PopularityRecallStrategy::new(10).recall("u1", &store, &exclude);
        let ids: Vec<&str> = candidates.iter().map(|c| c.item_id.as_str()).collect();

        assert_eq!(ids, vec!["a", "b", "d"]);
        assert!((candidates[0].recall_score - 0.5).abs() < 1e-6);
        assert_eq!(candidates[2].recall_score, 0.0);
    }

    #[test]
    fn test_empty_catalogue() {
        let candidates = PopularityRecallStrategy::new(10).recall(
            "u1",
            &MetadataStore::default(),
            &HashSet::new(),
        );
        assert!(candidates.is_empty());
    }
}
