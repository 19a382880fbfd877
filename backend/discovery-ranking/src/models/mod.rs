use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type UserId = String;
pub type ItemId = String;

/// Strength assigned to a click, which carries no completion information.
pub const CLICK_SIGNAL_STRENGTH: f32 = 0.25;

/// Implicit feedback carried by an interaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// Fraction of the item watched (0.0 - 1.0)
    Watch { pct: f32 },
    Click,
}

impl Signal {
    /// Strength used for the collaborative-filtering vectors, in [0, 1]
    pub fn strength(&self) -> f32 {
        match self {
            Signal::Watch { pct } => pct.clamp(0.0, 1.0),
            Signal::Click => CLICK_SIGNAL_STRENGTH,
        }
    }

    pub fn watch_pct(&self) -> Option<f32> {
        match self {
            Signal::Watch { pct } => Some(pct.clamp(0.0, 1.0)),
            Signal::Click => None,
        }
    }
}

/// Bounded relevance scale used for training labels and evaluation.
///
/// The mapping from raw signal happens once, in [`RelevanceGrade::from_signal`].
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[repr(u8)]
pub enum RelevanceGrade {
    #[default]
    Irrelevant = 0,
    Marginal = 1,
    Relevant = 2,
    Highly = 3,
}

impl RelevanceGrade {
    pub fn from_signal(signal: &Signal) -> Self {
        match signal {
            Signal::Watch { pct } if *pct >= 0.8 => RelevanceGrade::Highly,
            Signal::Watch { pct } if *pct >= 0.5 => RelevanceGrade::Relevant,
            Signal::Watch { pct } if *pct >= 0.2 => RelevanceGrade::Marginal,
            Signal::Watch { .. } => RelevanceGrade::Irrelevant,
            Signal::Click => RelevanceGrade::Marginal,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Exponential gain `2^rel - 1` used by DCG
    pub fn gain(self) -> f64 {
        f64::from((1u32 << self.as_u8()) - 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum MaturityRating {
    #[default]
    General,
    Teen,
    Mature,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentMetadata {
    pub item_id: ItemId,
    /// First entry is the primary genre
    pub genres: Vec<String>,
    pub duration_minutes: f32,
    pub release_date: DateTime<Utc>,
    /// Raw global popularity, any non-negative scale
    pub popularity: f32,
    #[serde(default)]
    pub maturity: MaturityRating,
}

impl ContentMetadata {
    pub fn primary_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn of(timestamp: &DateTime<Utc>) -> Self {
        Self::from_hour(timestamp.hour())
    }

    pub fn index(self) -> usize {
        match self {
            TimeOfDay::Morning => 0,
            TimeOfDay::Afternoon => 1,
            TimeOfDay::Evening => 2,
            TimeOfDay::Night => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Mobile,
    Tablet,
    #[default]
    Tv,
    Desktop,
}

/// Per-request context; never persisted beyond the request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: UserId,
    pub time_of_day: TimeOfDay,
    pub device: Device,
    /// genre -> affinity in [0, 1]
    pub recent_genre_affinity: HashMap<String, f32>,
    /// Reference "now" for time-dependent features
    pub requested_at: DateTime<Utc>,
    pub max_maturity: MaturityRating,
}

impl SessionContext {
    /// Neutral context used when no stored context exists for a user
    pub fn neutral(user_id: &str, requested_at: DateTime<Utc>) -> Self {
        Self {
            session_id: format!("neutral:{}", user_id),
            user_id: user_id.to_string(),
            time_of_day: TimeOfDay::of(&requested_at),
            device: Device::default(),
            recent_genre_affinity: HashMap::new(),
            requested_at,
            max_maturity: MaturityRating::Mature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub recall_score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartReason {
    NoHistory,
    NoPositiveSignals,
    NoNeighbours,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Collaborative,
    PopularityFallback { reason: ColdStartReason },
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Collaborative => "item_cf",
            CandidateSource::PopularityFallback { .. } => "popularity_fallback",
        }
    }

    pub fn is_cold_start(&self) -> bool {
        matches!(self, CandidateSource::PopularityFallback { .. })
    }
}

/// Recall output for one user, ordered by recall score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateSet {
    pub user_id: UserId,
    pub source: CandidateSource,
    pub candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.candidates.iter().map(|c| c.item_id.clone()).collect()
    }
}

/// Column order of the feature matrix
pub const FEATURE_NAMES: [&str; 6] = [
    "genre_match",
    "popularity",
    "popularity_decay",
    "avg_user_watch_pct",
    "duration_match",
    "time_of_day_match",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub genre_match: f32,
    pub popularity: f32,
    pub popularity_decay: f32,
    pub avg_user_watch_pct: f32,
    pub duration_match: f32,
    pub time_of_day_match: f32,
}

impl FeatureVector {
    /// Layout follows [`FEATURE_NAMES`]
    pub fn to_vector(&self) -> [f32; FEATURE_COUNT] {
        [
            self.genre_match,
            self.popularity,
            self.popularity_decay,
            self.avg_user_watch_pct,
            self.duration_match,
            self.time_of_day_match,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedItem {
    pub item_id: ItemId,
    pub model_score: f32,
    /// 1-based position after business rules
    pub final_rank: usize,
}
