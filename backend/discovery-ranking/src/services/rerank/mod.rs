mod rules;

use crate::config::RerankConfig;
use crate::models::{ItemId, RankedItem};
use crate::utils::cmp_desc_nan_last;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

pub use rules::{
    BusinessRule, FullyWatchedAction, FullyWatchedRule, MaturityRule, RuleAction, RuleContext,
};

/// Model output for one candidate, before ordering
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub model_score: f32,
    pub popularity_decay: f32,
}

/// Audit entry for every non-`Keep` rule outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDecision {
    pub item_id: ItemId,
    pub rule: String,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RerankOutcome {
    pub items: Vec<RankedItem>,
    pub decisions: Vec<RuleDecision>,
}

/// Total order: score desc (NaN last), popularity decay desc, item_id asc
pub fn compare_scored(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    cmp_desc_nan_last(a.model_score, b.model_score)
        .then_with(|| cmp_desc_nan_last(a.popularity_decay, b.popularity_decay))
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Re-Ranker：排序 + 業務規則
///
/// Orders one group by model score and then applies the business rules in
/// registration order. A `Remove` from any rule drops the item; a `Demote`
/// moves it to the tail unless a later rule removes it.
pub struct ReRanker {
    rules: Vec<Box<dyn BusinessRule>>,
}

impl ReRanker {
    pub fn new(rules: Vec<Box<dyn BusinessRule>>) -> Self {
        Self { rules }
    }

    /// Ordering only, no business rules
    pub fn unfiltered() -> Self {
        Self::new(Vec::new())
    }

    pub fn from_config(config: &RerankConfig) -> Self {
        let mut rules: Vec<Box<dyn BusinessRule>> = Vec::new();
        if config.enforce_maturity {
            rules.push(Box::new(MaturityRule));
        }
        rules.push(Box::new(FullyWatchedRule::new(config.fully_watched_action)));
        Self::new(rules)
    }

    /// (name, rationale) of every rule, in evaluation order
    pub fn rules(&self) -> Vec<(&'static str, &'static str)> {
        self.rules.iter().map(|r| (r.name(), r.rationale())).collect()
    }

    /// Sort without applying rules
    pub fn order(mut items: Vec<ScoredItem>) -> Vec<ScoredItem> {
        items.sort_by(compare_scored);
        items
    }

    pub fn rank(&self, items: Vec<ScoredItem>, ctx: &RuleContext<'_>) -> RerankOutcome {
        let ordered = Self::order(items);

        let mut kept: Vec<ScoredItem> = Vec::with_capacity(ordered.len());
        let mut demoted: Vec<ScoredItem> = Vec::new();
        let mut decisions: Vec<RuleDecision> = Vec::new();

        'items: for item in ordered {
            let mut demote = false;
            for rule in &self.rules {
                let action = rule.evaluate(ctx, &item);
                if action == RuleAction::Keep {
                    continue;
                }
                decisions.push(RuleDecision {
                    item_id: item.item_id.clone(),
                    rule: rule.name().to_string(),
                    action,
                });
                match action {
                    RuleAction::Remove => continue 'items,
                    RuleAction::Demote => demote = true,
                    RuleAction::Keep => {}
                }
            }

            if demote {
                demoted.push(item);
            } else {
                kept.push(item);
            }
        }

        let items: Vec<RankedItem> = kept
            .into_iter()
            .chain(demoted)
            .enumerate()
            .map(|(idx, item)| RankedItem {
                item_id: item.item_id,
                model_score: item.model_score,
                final_rank: idx + 1,
            })
            .collect();

        debug!(
            session_id = %ctx.session.session_id,
            ranked = items.len(),
            rule_decisions = decisions.len(),
            "Re-ranking complete"
        );

        RerankOutcome { items, decisions }
    }
}

impl Default for ReRanker {
    fn default() -> Self {
        Self::from_config(&RerankConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, MaturityRating, SessionContext};
    use crate::store::MetadataStore;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn scored(id: &str, score: f32, decay: f32) -> ScoredItem {
        ScoredItem {
            item_id: id.to_string(),
            model_score: score,
            popularity_decay: decay,
        }
    }

    fn ids(outcome: &RerankOutcome) -> Vec<&str> {
        outcome.items.iter().map(|i| i.item_id.as_str()).collect()
    }

    struct Fixture {
        session: SessionContext,
        watched: HashSet<ItemId>,
        metadata: MetadataStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                session: SessionContext::neutral("u1", Utc::now()),
                watched: HashSet::new(),
                metadata: MetadataStore::default(),
            }
        }

        fn ctx(&self) -> RuleContext<'_> {
            RuleContext {
                session: &self.session,
                fully_watched: &self.watched,
                metadata: &self.metadata,
            }
        }
    }

    #[test]
    fn test_tie_broken_by_decay_then_id() {
        let fixture = Fixture::new();
        let items = vec![
            scored("c", 0.75, 0.2),
            scored("b", 0.75, 0.4),
            scored("a", 0.75, 0.2),
            scored("z", 0.9, 0.0),
        ];

        let outcome = ReRanker::unfiltered().rank(items, &fixture.ctx());

        assert_eq!(ids(&outcome), vec!["z", "b", "a", "c"]);
        let ranks: Vec<usize> = outcome.items.iter().map(|i| i.final_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_order_independent_of_input_order() {
        let fixture = Fixture::new();
        let mut items = vec![
            scored("a", 0.75, 0.3),
            scored("b", 0.75, 0.3),
            scored("c", 0.1, 0.9),
        ];
        let first = ReRanker::unfiltered().rank(items.clone(), &fixture.ctx());
        items.reverse();
        let second = ReRanker::unfiltered().rank(items, &fixture.ctx());

        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nan_sorts_last() {
        let fixture = Fixture::new();
        let items = vec![scored("nan", f32::NAN, 1.0), scored("low", -5.0, 0.0)];
        let outcome = ReRanker::unfiltered().rank(items, &fixture.ctx());
        assert_eq!(ids(&outcome), vec!["low", "nan"]);
    }

    #[test]
    fn test_nan_sorts_after_negative_infinity() {
        let fixture = Fixture::new();
        // a NaN tied with -inf would win on popularity decay
        let items = vec![
            scored("a-nan", f32::NAN, 1.0),
            scored("b-neg-inf", f32::NEG_INFINITY, 0.0),
        ];
        let outcome = ReRanker::unfiltered().rank(items, &fixture.ctx());
        assert_eq!(ids(&outcome), vec!["b-neg-inf", "a-nan"]);
        assert_eq!(
            compare_scored(&scored("x", f32::NAN, 0.0), &scored("y", f32::NEG_INFINITY, 0.0)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_rules_remove_and_demote() {
        let mut fixture = Fixture::new();
        fixture.session.max_maturity = MaturityRating::Teen;
        fixture.watched.insert("seen".to_string());
        fixture.metadata = MetadataStore::from_rows(vec![ContentMetadata {
            item_id: "adult".to_string(),
            genres: vec!["thriller".to_string()],
            duration_minutes: 110.0,
            release_date: Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap(),
            popularity: 10.0,
            maturity: MaturityRating::Mature,
        }]);

        let reranker = ReRanker::from_config(&RerankConfig {
            enforce_maturity: true,
            fully_watched_action: FullyWatchedAction::Demote,
        });
        let items = vec![
            scored("seen", 0.9, 0.5),
            scored("adult", 0.8, 0.5),
            scored("fresh", 0.7, 0.5),
            scored("other", 0.6, 0.5),
        ];

        let outcome = reranker.rank(items, &fixture.ctx());

        assert_eq!(ids(&outcome), vec!["fresh", "other", "seen"]);
        assert_eq!(outcome.items[2].final_rank, 3);
        assert_eq!(
            outcome.decisions,
            vec![
                RuleDecision {
                    item_id: "seen".to_string(),
                    rule: "fully_watched".to_string(),
                    action: RuleAction::Demote,
                },
                RuleDecision {
                    item_id: "adult".to_string(),
                    rule: "maturity".to_string(),
                    action: RuleAction::Remove,
                },
            ]
        );
    }

    #[test]
    fn test_rule_listing() {
        let reranker = ReRanker::default();
        let names: Vec<&str> = reranker.rules().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["maturity", "fully_watched"]);
    }

    #[test]
    fn test_empty_input() {
        let fixture = Fixture::new();
        let outcome = ReRanker::default().rank(Vec::new(), &fixture.ctx());
        assert!(outcome.items.is_empty());
        assert!(outcome.decisions.is_empty());
    }
}
