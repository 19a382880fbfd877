// Utility functions for discovery-ranking

use std::cmp::Ordering;

/// Normalize a score to [0, 1] range
pub fn normalize_score(score: f32, min: f32, max: f32) -> f32 {
    if max - min < f32::EPSILON {
        0.5
    } else {
        ((score - min) / (max - min)).clamp(0.0, 1.0)
    }
}

/// Exponential decay `exp(-lambda * age)`; negative ages count as fresh
pub fn exponential_decay(age: f32, lambda: f32) -> f32 {
    (-lambda * age.max(0.0)).exp()
}

/// Descending comparison with NaN after every real score, `-inf` included
pub fn cmp_desc_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Min and max of a non-empty slice, ignoring NaN
pub fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
