use crate::models::{ItemId, SessionContext};
use crate::store::MetadataStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::ScoredItem;

/// What a rule does with one scored item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Keep,
    Remove,
    /// Move after every non-demoted item
    Demote,
}

/// Inputs a rule may consult; rules never see or change feature values
pub struct RuleContext<'a> {
    pub session: &'a SessionContext,
    pub fully_watched: &'a HashSet<ItemId>,
    pub metadata: &'a MetadataStore,
}

/// Post-scoring business rule
pub trait BusinessRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Human-readable reason shown next to the rule in audits
    fn rationale(&self) -> &'static str;

    fn evaluate(&self, ctx: &RuleContext<'_>, item: &ScoredItem) -> RuleAction;
}

/// Drops items rated above the session's maturity ceiling
#[derive(Debug, Clone, Copy, Default)]
pub struct MaturityRule;

impl BusinessRule for MaturityRule {
    fn name(&self) -> &'static str {
        "maturity"
    }

    fn rationale(&self) -> &'static str {
        "content rated above the profile's maturity ceiling must not be shown"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>, item: &ScoredItem) -> RuleAction {
        match ctx.metadata.get(&item.item_id) {
            Some(meta) if meta.maturity > ctx.session.max_maturity => RuleAction::Remove,
            _ => RuleAction::Keep,
        }
    }
}

/// Handling of items the user already finished
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FullyWatchedAction {
    #[default]
    Remove,
    Demote,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FullyWatchedRule {
    action: FullyWatchedAction,
}

impl FullyWatchedRule {
    pub fn new(action: FullyWatchedAction) -> Self {
        Self { action }
    }
}

impl BusinessRule for FullyWatchedRule {
    fn name(&self) -> &'static str {
        "fully_watched"
    }

    fn rationale(&self) -> &'static str {
        "items the user has already finished are not discoveries"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>, item: &ScoredItem) -> RuleAction {
        if !ctx.fully_watched.contains(&item.item_id) {
            return RuleAction::Keep;
        }
        match self.action {
            FullyWatchedAction::Remove => RuleAction::Remove,
            FullyWatchedAction::Demote => RuleAction::Demote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, MaturityRating};
    use chrono::{TimeZone, Utc};

    fn item(id: &str) -> ScoredItem {
        ScoredItem {
            item_id: id.to_string(),
            model_score: 0.5,
            popularity_decay: 0.5,
        }
    }

    fn metadata(id: &str, maturity: MaturityRating) -> ContentMetadata {
        ContentMetadata {
            item_id: id.to_string(),
            genres: vec!["drama".to_string()],
            duration_minutes: 90.0,
            release_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            popularity: 1.0,
            maturity,
        }
    }

    #[test]
    fn test_maturity_rule() {
        let metadata = MetadataStore::from_rows(vec![
            metadata("kids", MaturityRating::General),
            metadata("teen", MaturityRating::Teen),
            metadata("adult", MaturityRating::Mature),
        ]);
        let mut session = SessionContext::neutral("u1", Utc::now());
        session.max_maturity = MaturityRating::Teen;
        let watched = HashSet::new();
        let ctx = RuleContext {
            session: &session,
            fully_watched: &watched,
            metadata: &metadata,
        };

        let rule = MaturityRule;
        assert_eq!(rule.evaluate(&ctx, &item("kids")), RuleAction::Keep);
        assert_eq!(rule.evaluate(&ctx, &item("teen")), RuleAction::Keep);
        assert_eq!(rule.evaluate(&ctx, &item("adult")), RuleAction::Remove);
    }

    #[test]
    fn test_fully_watched_rule_action() {
        let metadata = MetadataStore::default();
        let session = SessionContext::neutral("u1", Utc::now());
        let watched: HashSet<ItemId> = ["seen".to_string()].into_iter().collect();
        let ctx = RuleContext {
            session: &session,
            fully_watched: &watched,
            metadata: &metadata,
        };

        let remove = FullyWatchedRule::new(FullyWatchedAction::Remove);
        let demote = FullyWatchedRule::new(FullyWatchedAction::Demote);
        assert_eq!(remove.evaluate(&ctx, &item("seen")), RuleAction::Remove);
        assert_eq!(demote.evaluate(&ctx, &item("seen")), RuleAction::Demote);
        assert_eq!(demote.evaluate(&ctx, &item("fresh")), RuleAction::Keep);
    }

    #[test]
    fn test_action_parses_lowercase() {
        let action: FullyWatchedAction = serde_json::from_str("\"demote\"").unwrap();
        assert_eq!(action, FullyWatchedAction::Demote);
    }
}
