// ============================================
// Read-only snapshot stores
// ============================================
//
// Interaction log, content metadata and stored session contexts exposed to
// the ranking core as immutable, indexed collections. A snapshot is built
// once and shared behind an Arc by every concurrent request.

use crate::models::{
    ContentMetadata, Interaction, ItemId, RelevanceGrade, SessionContext, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Append-only interaction log with per-user and per-item indexes
#[derive(Debug, Clone, Default)]
pub struct InteractionStore {
    interactions: Vec<Interaction>,
    by_user: HashMap<UserId, Vec<usize>>,
    by_item: HashMap<ItemId, Vec<usize>>,
    global_mean_watch_pct: Option<f32>,
}

impl InteractionStore {
    pub fn from_interactions(interactions: Vec<Interaction>) -> Self {
        let mut by_user: HashMap<UserId, Vec<usize>> = HashMap::new();
        let mut by_item: HashMap<ItemId, Vec<usize>> = HashMap::new();
        let mut watch_sum = 0.0f64;
        let mut watch_count = 0usize;

        for (idx, interaction) in interactions.iter().enumerate() {
            by_user
                .entry(interaction.user_id.clone())
                .or_default()
                .push(idx);
            by_item
                .entry(interaction.item_id.clone())
                .or_default()
                .push(idx);
            if let Some(pct) = interaction.signal.watch_pct() {
                watch_sum += f64::from(pct);
                watch_count += 1;
            }
        }

        let global_mean_watch_pct = if watch_count > 0 {
            Some((watch_sum / watch_count as f64) as f32)
        } else {
            None
        };

        Self {
            interactions,
            by_user,
            by_item,
            global_mean_watch_pct,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.iter()
    }

    pub fn for_user<'a>(&'a self, user_id: &str) -> impl Iterator<Item = &'a Interaction> + 'a {
        self.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.interactions[idx])
    }

    pub fn for_item<'a>(&'a self, item_id: &str) -> impl Iterator<Item = &'a Interaction> + 'a {
        self.by_item
            .get(item_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.interactions[idx])
    }

    pub fn has_history(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    /// All users with at least one interaction, sorted ascending
    pub fn users(&self) -> Vec<&str> {
        let mut users: Vec<&str> = self.by_user.keys().map(String::as_str).collect();
        users.sort_unstable();
        users
    }

    /// Strongest signal per item for a user
    pub fn user_item_strengths(&self, user_id: &str) -> HashMap<ItemId, f32> {
        let mut strengths: HashMap<ItemId, f32> = HashMap::new();
        for interaction in self.for_user(user_id) {
            let strength = interaction.signal.strength();
            strengths
                .entry(interaction.item_id.clone())
                .and_modify(|s| *s = s.max(strength))
                .or_insert(strength);
        }
        strengths
    }

    /// Items whose watch percentage reached `threshold` for this user
    pub fn fully_consumed(&self, user_id: &str, threshold: f32) -> HashSet<ItemId> {
        self.for_user(user_id)
            .filter(|i| i.signal.watch_pct().is_some_and(|pct| pct >= threshold))
            .map(|i| i.item_id.clone())
            .collect()
    }

    /// Highest relevance grade the user produced for an item
    pub fn grade_for(&self, user_id: &str, item_id: &str) -> RelevanceGrade {
        self.for_user(user_id)
            .filter(|i| i.item_id == item_id)
            .map(|i| RelevanceGrade::from_signal(&i.signal))
            .max()
            .unwrap_or_default()
    }

    /// Distinct items of a user, most recently touched first (ties: item_id asc)
    pub fn recent_items(&self, user_id: &str) -> Vec<(ItemId, DateTime<Utc>)> {
        let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for interaction in self.for_user(user_id) {
            latest
                .entry(interaction.item_id.as_str())
                .and_modify(|ts| {
                    if interaction.timestamp > *ts {
                        *ts = interaction.timestamp;
                    }
                })
                .or_insert(interaction.timestamp);
        }

        let mut items: Vec<(ItemId, DateTime<Utc>)> = latest
            .into_iter()
            .map(|(item, ts)| (item.to_string(), ts))
            .collect();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        items
    }

    pub fn global_mean_watch_pct(&self) -> Option<f32> {
        self.global_mean_watch_pct
    }
}

/// Content metadata keyed by item id
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    rows: HashMap<ItemId, ContentMetadata>,
}

impl MetadataStore {
    pub fn from_rows(rows: Vec<ContentMetadata>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| (row.item_id.clone(), row))
                .collect(),
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&ContentMetadata> {
        self.rows.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentMetadata> {
        self.rows.values()
    }

    /// Catalogue item ids, sorted ascending
    pub fn item_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.rows.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn popularity(&self, item_id: &str) -> f32 {
        self.rows.get(item_id).map(|m| m.popularity).unwrap_or(0.0)
    }
}

/// Source of the session context to use for a user outside a live request
pub trait SessionContextProvider: Send + Sync {
    fn context_for(&self, user_id: &str) -> Option<SessionContext>;
}

/// Last known session context per user
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    contexts: HashMap<UserId, SessionContext>,
}

impl ContextStore {
    pub fn from_contexts(contexts: Vec<SessionContext>) -> Self {
        Self {
            contexts: contexts
                .into_iter()
                .map(|ctx| (ctx.user_id.clone(), ctx))
                .collect(),
        }
    }
}

impl SessionContextProvider for ContextStore {
    fn context_for(&self, user_id: &str) -> Option<SessionContext> {
        self.contexts.get(user_id).cloned()
    }
}

/// Immutable view of every input collaborator for the duration of a request
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub interactions: InteractionStore,
    pub metadata: MetadataStore,
    pub contexts: ContextStore,
    pub as_of: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(
        interactions: Vec<Interaction>,
        metadata: Vec<ContentMetadata>,
        contexts: Vec<SessionContext>,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            interactions: InteractionStore::from_interactions(interactions),
            metadata: MetadataStore::from_rows(metadata),
            contexts: ContextStore::from_contexts(contexts),
            as_of,
        }
    }

    /// Stored context for a user, or a neutral one anchored at `as_of`
    pub fn context_or_neutral(&self, user_id: &str) -> SessionContext {
        self.contexts
            .context_for(user_id)
            .unwrap_or_else(|| SessionContext::neutral(user_id, self.as_of))
    }
}
