// ============================================
// Synthetic Snapshot (合成資料)
// ============================================
// Seeded catalogue, users and interactions for offline runs and tests.
// Each user prefers two genres; watch completion follows that preference,
// so a learned ranker has real signal to find.

use crate::error::{RankingError, Result};
use crate::models::{
    ContentMetadata, Device, Interaction, MaturityRating, SessionContext, Signal, TimeOfDay,
    UserId,
};
use crate::store::Snapshot;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub const GENRES: [&str; 8] = [
    "action",
    "comedy",
    "drama",
    "documentary",
    "romance",
    "thriller",
    "animation",
    "sci-fi",
];

const DEVICES: [Device; 4] = [Device::Mobile, Device::Tablet, Device::Tv, Device::Desktop];

/// Synthetic data shape (`SYNTHETIC_*`)
#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_users")]
    pub users: usize,
    #[serde(default = "default_items")]
    pub items: usize,
    #[serde(default = "default_max_interactions_per_user")]
    pub max_interactions_per_user: usize,
    /// Probability that an interaction targets one of the user's favourite genres
    #[serde(default = "default_preference_strength")]
    pub preference_strength: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_users() -> usize {
    200
}
fn default_items() -> usize {
    300
}
fn default_max_interactions_per_user() -> usize {
    30
}
fn default_preference_strength() -> f64 {
    0.75
}
fn default_seed() -> u64 {
    7
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            items: default_items(),
            max_interactions_per_user: default_max_interactions_per_user(),
            preference_strength: default_preference_strength(),
            seed: default_seed(),
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 || self.items == 0 {
            return Err(RankingError::Configuration(
                "synthetic users and items must be positive".to_string(),
            ));
        }
        if self.max_interactions_per_user == 0 {
            return Err(RankingError::Configuration(
                "synthetic max_interactions_per_user must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.preference_strength) {
            return Err(RankingError::Configuration(format!(
                "synthetic preference_strength must be within [0, 1], got {}",
                self.preference_strength
            )));
        }
        Ok(())
    }

    /// Fixed reference time so generated snapshots are reproducible
    pub fn default_as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn generate(&self, as_of: DateTime<Utc>) -> Result<Snapshot> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let catalogue: Vec<ContentMetadata> =
            (0..self.items).map(|i| random_item(&mut rng, i, as_of)).collect();

        let mut by_genre: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, item) in catalogue.iter().enumerate() {
            if let Some(genre) = item.primary_genre() {
                by_genre.entry(genre).or_default().push(idx);
            }
        }

        let mut interactions = Vec::new();
        let mut contexts = Vec::with_capacity(self.users);

        for u in 0..self.users {
            let user_id = format!("user_{:04}", u);
            let favourites: Vec<&str> = GENRES.choose_multiple(&mut rng, 2).copied().collect();
            let habit = TimeOfDay::ALL[rng.gen_range(0..TimeOfDay::ALL.len())];

            let count = rng.gen_range(1..=self.max_interactions_per_user);
            for _ in 0..count {
                let favourite_pool = favourites
                    .choose(&mut rng)
                    .and_then(|g| by_genre.get(g))
                    .filter(|pool| !pool.is_empty());
                let item_idx = match favourite_pool {
                    Some(pool) if rng.gen_bool(self.preference_strength) => {
                        pool[rng.gen_range(0..pool.len())]
                    }
                    _ => rng.gen_range(0..catalogue.len()),
                };
                let item = &catalogue[item_idx];
                let liked = item
                    .primary_genre()
                    .is_some_and(|g| favourites.iter().any(|f| *f == g));

                let signal = if rng.gen_bool(0.1) {
                    Signal::Click
                } else if liked {
                    Signal::Watch {
                        pct: rng.gen_range(0.55..=1.0),
                    }
                } else {
                    Signal::Watch {
                        pct: rng.gen_range(0.0..0.45),
                    }
                };

                let hour = if rng.gen_bool(0.7) {
                    hour_in(habit, &mut rng)
                } else {
                    rng.gen_range(0..24)
                };
                let day = as_of - Duration::days(rng.gen_range(1..120));
                let timestamp = day
                    .date_naive()
                    .and_hms_opt(hour, rng.gen_range(0..60), 0)
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .unwrap_or(day);

                interactions.push(Interaction {
                    user_id: user_id.clone(),
                    item_id: item.item_id.clone(),
                    signal,
                    timestamp,
                });
            }

            let mut affinity = HashMap::new();
            affinity.insert(favourites[0].to_string(), 0.8);
            if let Some(second) = favourites.get(1) {
                affinity.insert(second.to_string(), 0.5);
            }
            contexts.push(SessionContext {
                session_id: format!("ctx_{}", user_id),
                user_id,
                time_of_day: habit,
                device: DEVICES[rng.gen_range(0..DEVICES.len())],
                recent_genre_affinity: affinity,
                requested_at: as_of,
                max_maturity: if rng.gen_bool(0.15) {
                    MaturityRating::Teen
                } else {
                    MaturityRating::Mature
                },
            });
        }

        info!(
            users = self.users,
            items = catalogue.len(),
            interactions = interactions.len(),
            seed = self.seed,
            "Synthetic snapshot generated"
        );

        Ok(Snapshot::new(interactions, catalogue, contexts, as_of))
    }
}

fn random_item(rng: &mut StdRng, idx: usize, as_of: DateTime<Utc>) -> ContentMetadata {
    let primary = GENRES[rng.gen_range(0..GENRES.len())];
    let mut genres = vec![primary.to_string()];
    if rng.gen_bool(0.4) {
        let secondary = GENRES[rng.gen_range(0..GENRES.len())];
        if secondary != primary {
            genres.push(secondary.to_string());
        }
    }

    let duration_minutes = match primary {
        "animation" | "comedy" => rng.gen_range(20.0..100.0),
        "documentary" => rng.gen_range(40.0..120.0),
        _ => rng.gen_range(80.0..180.0),
    };
    let maturity = match primary {
        "animation" | "documentary" => MaturityRating::General,
        "thriller" => MaturityRating::Mature,
        _ if rng.gen_bool(0.3) => MaturityRating::Mature,
        _ => MaturityRating::Teen,
    };

    ContentMetadata {
        item_id: format!("item_{:04}", idx),
        genres,
        duration_minutes,
        release_date: as_of - Duration::days(rng.gen_range(0..1500)),
        // heavy-tailed popularity
        popularity: rng.gen::<f32>().powi(3) * 1000.0,
        maturity,
    }
}

fn hour_in(bucket: TimeOfDay, rng: &mut StdRng) -> u32 {
    match bucket {
        TimeOfDay::Morning => rng.gen_range(5..=11),
        TimeOfDay::Afternoon => rng.gen_range(12..=16),
        TimeOfDay::Evening => rng.gen_range(17..=21),
        TimeOfDay::Night => (22 + rng.gen_range(0..7)) % 24,
    }
}

/// Seeded train/holdout split of `users`; holdout gets `round(n · fraction)` users
pub fn split_users(users: &[&str], holdout_fraction: f32, seed: u64) -> (Vec<UserId>, Vec<UserId>) {
    let mut shuffled: Vec<UserId> = users.iter().map(|u| u.to_string()).collect();
    shuffled.sort();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

    let holdout_len = ((shuffled.len() as f32) * holdout_fraction.clamp(0.0, 1.0)).round() as usize;
    let train = shuffled.split_off(holdout_len);
    (train, shuffled)
}
