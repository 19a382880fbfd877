// ============================================
// Feature Builder
// ============================================
// Computes one FeatureVector per (user, candidate, session) triple.
// Every feature is a pure function of the snapshot, the candidate list and
// the session context, so training and inference share this code unchanged.

use crate::config::FeatureConfig;
use crate::error::{RankingError, Result};
use crate::models::{
    Candidate, ContentMetadata, Device, FeatureVector, SessionContext, TimeOfDay, FEATURE_COUNT,
};
use crate::store::Snapshot;
use crate::utils::{exponential_decay, min_max, normalize_score};
use ndarray::Array2;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const SECONDS_PER_DAY: f32 = 86_400.0;

/// Genres that fit poorly into a night session when no viewing data exists
const NIGHT_MISMATCH_GENRES: [&str; 2] = ["comedy", "romance"];

/// Feature output for one request: vectors for every candidate that could be
/// built, plus per-candidate failures.
#[derive(Debug, Clone, Default)]
pub struct FeatureBatch {
    pub vectors: Vec<FeatureVector>,
    pub failures: Vec<RankingError>,
}

impl FeatureBatch {
    pub fn matrix(&self) -> Array2<f32> {
        feature_matrix(&self.vectors)
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Stack feature vectors into a `rows × FEATURE_COUNT` matrix
pub fn feature_matrix(vectors: &[FeatureVector]) -> Array2<f32> {
    let rows: Vec<[f32; FEATURE_COUNT]> =
        vectors.iter().map(FeatureVector::to_vector).collect();
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| rows[i][j])
}

/// Per-user aggregates derived from the interaction history
#[derive(Debug, Clone, Default)]
struct UserProfile {
    /// genre -> weight normalised so the strongest genre is 1.0
    genre_affinity: HashMap<String, f32>,
    /// primary genre -> (sum of watch pct, count)
    genre_watch: HashMap<String, (f32, u32)>,
    /// watch-pct-weighted mean duration of watched items
    preferred_duration: Option<f32>,
}

#[derive(Clone)]
pub struct FeatureBuilder {
    snapshot: Arc<Snapshot>,
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(snapshot: Arc<Snapshot>, config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { snapshot, config })
    }

    /// Build features for every candidate of `user_id`.
    ///
    /// Candidates without metadata are excluded and reported as
    /// `DataIntegrity` failures; they are never zero-filled.
    pub fn build(
        &self,
        user_id: &str,
        candidates: &[Candidate],
        session: &SessionContext,
    ) -> Result<FeatureBatch> {
        self.build_rows(user_id, candidates, session, false)
    }

    /// Same as [`build`](Self::build), but each row ignores the user's own
    /// interactions with that row's item.
    ///
    /// Used for labelled rows: the label is derived from those interactions,
    /// so they must not reach the features.
    pub fn build_held_out(
        &self,
        user_id: &str,
        candidates: &[Candidate],
        session: &SessionContext,
    ) -> Result<FeatureBatch> {
        self.build_rows(user_id, candidates, session, true)
    }

    fn build_rows(
        &self,
        user_id: &str,
        candidates: &[Candidate],
        session: &SessionContext,
        held_out: bool,
    ) -> Result<FeatureBatch> {
        if session.user_id != user_id {
            return Err(RankingError::InvalidInput(format!(
                "session {} belongs to user {}, not {}",
                session.session_id, session.user_id, user_id
            )));
        }

        let shared_profile = (!held_out).then(|| self.user_profile(user_id, None));
        let mut batch = FeatureBatch::default();

        let mut resolved: Vec<&ContentMetadata> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.snapshot.metadata.get(&candidate.item_id) {
                Some(meta) => resolved.push(meta),
                None => {
                    warn!(
                        user_id = %user_id,
                        item_id = %candidate.item_id,
                        "Candidate has no content metadata, excluded from features"
                    );
                    batch
                        .failures
                        .push(RankingError::missing_metadata(&candidate.item_id));
                }
            }
        }

        let pool: Vec<f32> = resolved.iter().map(|m| m.popularity).collect();
        let (pool_min, pool_max) = min_max(&pool).unwrap_or((0.0, 0.0));

        batch.vectors = resolved
            .into_iter()
            .map(|meta| {
                let popularity = normalize_score(meta.popularity, pool_min, pool_max);
                let held_out_user = held_out.then_some(user_id);
                let profile = match &shared_profile {
                    Some(profile) => Cow::Borrowed(profile),
                    None => Cow::Owned(self.user_profile(user_id, Some(meta.item_id.as_str()))),
                };
                FeatureVector {
                    user_id: user_id.to_string(),
                    item_id: meta.item_id.clone(),
                    genre_match: self.genre_match(&profile, meta, session),
                    popularity,
                    popularity_decay: self.popularity_decay(popularity, meta, session),
                    avg_user_watch_pct: self.avg_user_watch_pct(&profile, meta),
                    duration_match: self.duration_match(&profile, meta, session),
                    time_of_day_match: self.time_of_day_match(meta, session, held_out_user),
                }
            })
            .collect();

        debug!(
            user_id = %user_id,
            session_id = %session.session_id,
            built = batch.vectors.len(),
            failed = batch.failures.len(),
            held_out = held_out,
            "Features built"
        );

        Ok(batch)
    }

    /// History aggregates for `user_id`, skipping `excluded_item` if given
    fn user_profile(&self, user_id: &str, excluded_item: Option<&str>) -> UserProfile {
        let store = &self.snapshot.interactions;
        let metadata = &self.snapshot.metadata;
        let mut profile = UserProfile::default();
        let kept = |item_id: &str| excluded_item != Some(item_id);

        // Sorted so float accumulation order is stable
        let mut strengths: Vec<(String, f32)> = store
            .user_item_strengths(user_id)
            .into_iter()
            .filter(|(item_id, _)| kept(item_id.as_str()))
            .collect();
        strengths.sort_by(|a, b| a.0.cmp(&b.0));

        let mut genre_weights: HashMap<String, f32> = HashMap::new();
        for (item_id, strength) in &strengths {
            if let Some(meta) = metadata.get(item_id) {
                for genre in &meta.genres {
                    *genre_weights.entry(genre.clone()).or_insert(0.0) += strength;
                }
            }
        }
        let max_weight = genre_weights.values().copied().fold(0.0f32, f32::max);
        if max_weight > 0.0 {
            profile.genre_affinity = genre_weights
                .into_iter()
                .map(|(genre, w)| (genre, w / max_weight))
                .collect();
        }

        let mut duration_sum = 0.0f32;
        let mut duration_weight = 0.0f32;
        for interaction in store.for_user(user_id).filter(|i| kept(i.item_id.as_str())) {
            let (Some(pct), Some(meta)) = (
                interaction.signal.watch_pct(),
                metadata.get(&interaction.item_id),
            ) else {
                continue;
            };
            if let Some(genre) = meta.primary_genre() {
                let entry = profile
                    .genre_watch
                    .entry(genre.to_string())
                    .or_insert((0.0, 0));
                entry.0 += pct;
                entry.1 += 1;
            }
            duration_sum += pct * meta.duration_minutes;
            duration_weight += pct;
        }
        if duration_weight > 0.0 {
            profile.preferred_duration = Some(duration_sum / duration_weight);
        }

        profile
    }

    /// max over the item's genres of `(1 - α)·historical + α·session`
    fn genre_match(
        &self,
        profile: &UserProfile,
        meta: &ContentMetadata,
        session: &SessionContext,
    ) -> f32 {
        let alpha = if profile.genre_affinity.is_empty() {
            1.0
        } else {
            self.config.session_affinity_weight
        };

        meta.genres
            .iter()
            .map(|genre| {
                let historical = profile.genre_affinity.get(genre).copied().unwrap_or(0.0);
                let recent = session
                    .recent_genre_affinity
                    .get(genre)
                    .copied()
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                (1.0 - alpha) * historical + alpha * recent
            })
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0)
    }

    fn popularity_decay(
        &self,
        popularity: f32,
        meta: &ContentMetadata,
        session: &SessionContext,
    ) -> f32 {
        let age_days =
            (session.requested_at - meta.release_date).num_seconds() as f32 / SECONDS_PER_DAY;
        (popularity * exponential_decay(age_days, self.config.decay_lambda)).clamp(0.0, 1.0)
    }

    fn avg_user_watch_pct(&self, profile: &UserProfile, meta: &ContentMetadata) -> f32 {
        let genre_avg = meta
            .primary_genre()
            .and_then(|genre| profile.genre_watch.get(genre))
            .filter(|(_, count)| *count > 0)
            .map(|(sum, count)| sum / *count as f32);

        genre_avg
            .or_else(|| self.snapshot.interactions.global_mean_watch_pct())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }

    fn duration_match(
        &self,
        profile: &UserProfile,
        meta: &ContentMetadata,
        session: &SessionContext,
    ) -> f32 {
        match profile.preferred_duration {
            Some(preferred) => {
                let band = self.config.duration_band_minutes;
                let excess = ((meta.duration_minutes - preferred).abs() - band / 2.0).max(0.0);
                (1.0 / (1.0 + excess / band)).clamp(0.0, 1.0)
            }
            None => {
                if session.device == Device::Mobile
                    && meta.duration_minutes > self.config.long_form_minutes
                {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }

    /// Share of the item's views in the session's bucket, relative to its peak
    /// bucket. Views by `held_out_user` are not counted.
    fn time_of_day_match(
        &self,
        meta: &ContentMetadata,
        session: &SessionContext,
        held_out_user: Option<&str>,
    ) -> f32 {
        let mut buckets = [0u32; 4];
        for interaction in self.snapshot.interactions.for_item(&meta.item_id) {
            if held_out_user == Some(interaction.user_id.as_str()) {
                continue;
            }
            buckets[TimeOfDay::of(&interaction.timestamp).index()] += 1;
        }

        let peak = buckets.iter().copied().max().unwrap_or(0);
        if peak == 0 {
            let mismatch = session.time_of_day == TimeOfDay::Night
                && meta
                    .primary_genre()
                    .is_some_and(|g| NIGHT_MISMATCH_GENRES.contains(&g));
            return if mismatch { 0.0 } else { 1.0 };
        }

        (buckets[session.time_of_day.index()] as f32 / peak as f32).clamp(0.0, 1.0)
    }
}
