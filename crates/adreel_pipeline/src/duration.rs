//! Clip duration normalization.
//!
//! Video models accept only a handful of clip lengths. The normalizer turns
//! whatever combination of total length, clip length and clip count was
//! configured into one allowed clip length and a scene count.

use adreel_error::{AdreelResult, ConfigError};
use serde::{Deserialize, Serialize};

/// Scene count used when only one duration input is configured.
pub const DEFAULT_UNIT_COUNT: u32 = 5;

/// Largest scene count a single ad may be split into.
pub const MAX_UNIT_COUNT: u32 = 100;

/// Clip lengths accepted by Veo models.
pub const VEO_DURATIONS: [u32; 3] = [4, 6, 8];

/// Clip lengths accepted by Sora models.
pub const SORA_DURATIONS: [u32; 3] = [4, 8, 12];

/// Allowed clip lengths for a video model id.
pub fn allowed_durations_for(model: &str) -> Vec<u32> {
    if model.to_lowercase().contains("sora") {
        SORA_DURATIONS.to_vec()
    } else {
        VEO_DURATIONS.to_vec()
    }
}

/// Configured duration inputs, any of which may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DurationRequest {
    /// Requested clip length in seconds
    pub unit_seconds: Option<f64>,
    /// Requested number of clips
    pub unit_count: Option<u32>,
    /// Requested total length in seconds
    pub total_seconds: Option<f64>,
}

/// Result of normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDuration {
    /// Allowed clip length every scene uses
    pub unit_seconds: u32,
    /// Number of scenes
    pub unit_count: u32,
    /// Clip length before snapping to the allowed set
    pub requested_unit_seconds: f64,
    /// Resulting total length
    pub total_seconds: u32,
    /// Whether snapping changed the requested clip length
    pub adjusted: bool,
}

/// Nearest allowed value by absolute difference; ties go to the larger value.
///
/// Returns `None` only when `allowed` is empty.
///
/// # Examples
///
/// ```
/// use adreel_pipeline::nearest_allowed;
///
/// assert_eq!(nearest_allowed(6.0, &[4, 6, 8]), Some(6));
/// assert_eq!(nearest_allowed(7.0, &[4, 6, 8]), Some(8));
/// assert_eq!(nearest_allowed(100.0, &[4, 6, 8]), Some(8));
/// ```
pub fn nearest_allowed(requested: f64, allowed: &[u32]) -> Option<u32> {
    let mut sorted = allowed.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut best: Option<(u32, f64)> = None;
    for value in sorted {
        let diff = (f64::from(value) - requested).abs();
        // Ascending order, so `<=` lets the larger value win a tie
        if best.is_none_or(|(_, best_diff)| diff <= best_diff) {
            best = Some((value, diff));
        }
    }
    best.map(|(value, _)| value)
}

/// Resolve duration inputs against an allowed set.
///
/// The first complete combination wins:
/// 1. clip length and clip count
/// 2. total length and clip count (clip length = total / count)
/// 3. total length and clip length (count = round(total / clip), at least 1)
/// 4. total length alone, split into [`DEFAULT_UNIT_COUNT`] clips
/// 5. clip length alone, with [`DEFAULT_UNIT_COUNT`] clips
///
/// # Errors
///
/// Returns a [`ConfigError`] when no duration input is usable, the allowed
/// set is empty, or the inputs ask for more than [`MAX_UNIT_COUNT`] scenes.
pub fn normalize(request: &DurationRequest, allowed: &[u32]) -> AdreelResult<NormalizedDuration> {
    let positive = |v: Option<f64>| v.filter(|s| s.is_finite() && *s > 0.0);
    let unit = positive(request.unit_seconds);
    let total = positive(request.total_seconds);
    let count = request.unit_count.filter(|c| *c > 0);

    let (requested, unit_count) = match (unit, count, total) {
        (Some(unit), Some(count), _) => (unit, count),
        (_, Some(count), Some(total)) => (total / f64::from(count), count),
        (Some(unit), None, Some(total)) => {
            let clips = (total / unit).round();
            if clips > f64::from(MAX_UNIT_COUNT) {
                return Err(too_many_scenes(clips).into());
            }
            (unit, (clips as u32).max(1))
        }
        (None, None, Some(total)) => (total / f64::from(DEFAULT_UNIT_COUNT), DEFAULT_UNIT_COUNT),
        (Some(unit), None, None) => (unit, DEFAULT_UNIT_COUNT),
        (None, _, None) => {
            return Err(ConfigError::new(
                "video duration needs total_seconds or unit_seconds",
            )
            .into());
        }
    };

    if unit_count > MAX_UNIT_COUNT {
        return Err(too_many_scenes(f64::from(unit_count)).into());
    }

    let unit_seconds = nearest_allowed(requested, allowed)
        .ok_or_else(|| ConfigError::new("allowed clip duration set is empty"))?;
    let total_seconds = unit_seconds
        .checked_mul(unit_count)
        .ok_or_else(|| ConfigError::new("video duration too long"))?;

    Ok(NormalizedDuration {
        unit_seconds,
        unit_count,
        requested_unit_seconds: requested,
        total_seconds,
        adjusted: f64::from(unit_seconds) != requested,
    })
}

#[track_caller]
fn too_many_scenes(clips: f64) -> ConfigError {
    ConfigError::new(format!(
        "video duration too long: {} scenes exceeds the limit of {}",
        clips, MAX_UNIT_COUNT
    ))
}
