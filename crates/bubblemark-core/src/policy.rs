//! Strictness modes and the per-bubble fill decision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::results::BubbleFeature;

/// Distances this close to the tolerance band count as reaching it, so that
/// e.g. `0.6 - 0.5` scores full confidence against a 0.1 band.
const BAND_EPSILON: f64 = 1e-9;

/// Named strictness configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrictnessMode {
    /// Accepts faint or partial marks.
    Easy,
    #[default]
    Moderate,
    /// Rejects faint marks.
    Strict,
}

/// Fill threshold and tolerance band of one mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    pub fill_threshold: f64,
    pub tolerance_band: f64,
}

impl ModeProfile {
    /// Lowest confidence at which a single filled bubble is accepted as an
    /// answer.
    pub fn min_acceptance_confidence(&self) -> f64 {
        1.0 - 2.0 * self.tolerance_band
    }
}

const EASY: ModeProfile = ModeProfile {
    fill_threshold: 0.30,
    tolerance_band: 0.15,
};

const MODERATE: ModeProfile = ModeProfile {
    fill_threshold: 0.50,
    tolerance_band: 0.10,
};

const STRICT: ModeProfile = ModeProfile {
    fill_threshold: 0.80,
    tolerance_band: 0.05,
};

impl StrictnessMode {
    pub const ALL: [StrictnessMode; 3] = [
        StrictnessMode::Easy,
        StrictnessMode::Moderate,
        StrictnessMode::Strict,
    ];

    pub const fn profile(self) -> ModeProfile {
        match self {
            StrictnessMode::Easy => EASY,
            StrictnessMode::Moderate => MODERATE,
            StrictnessMode::Strict => STRICT,
        }
    }
}

impl fmt::Display for StrictnessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrictnessMode::Easy => write!(f, "easy"),
            StrictnessMode::Moderate => write!(f, "moderate"),
            StrictnessMode::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for StrictnessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(StrictnessMode::Easy),
            "moderate" | "default" => Ok(StrictnessMode::Moderate),
            "strict" => Ok(StrictnessMode::Strict),
            other => Err(format!(
                "unknown strictness mode: {other} (expected easy, moderate or strict)"
            )),
        }
    }
}

/// Decision for a single bubble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleClass {
    pub is_filled: bool,
    pub confidence: f64,
}

/// Classify one bubble under a strictness mode.
pub fn classify(feature: &BubbleFeature, mode: StrictnessMode) -> BubbleClass {
    let profile = mode.profile();
    BubbleClass {
        is_filled: feature.fill_ratio >= profile.fill_threshold,
        confidence: confidence_for(feature.fill_ratio, mode),
    }
}

/// Distance from the mode's threshold, normalized by its tolerance band and
/// clamped to `[0, 1]`.
pub fn confidence_for(fill_ratio: f64, mode: StrictnessMode) -> f64 {
    let profile = mode.profile();
    let distance = (fill_ratio - profile.fill_threshold).abs();
    if distance + BAND_EPSILON >= profile.tolerance_band {
        return 1.0;
    }
    (distance / profile.tolerance_band).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Choice;
    use crate::results::BoundingBox;

    fn feature(fill_ratio: f64) -> BubbleFeature {
        BubbleFeature {
            question_index: 1,
            choice: Choice::new('A').unwrap(),
            fill_ratio,
            mean_intensity: 255.0 * (1.0 - fill_ratio),
            bbox: BoundingBox {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
        }
    }

    #[test]
    fn profile_table() {
        let table: Vec<_> = StrictnessMode::ALL
            .iter()
            .map(|m| {
                let p = m.profile();
                (p.fill_threshold, p.tolerance_band)
            })
            .collect();
        assert_eq!(table, vec![(0.30, 0.15), (0.50, 0.10), (0.80, 0.05)]);
        let min = StrictnessMode::Moderate.profile().min_acceptance_confidence();
        assert!((min - 0.8).abs() < 1e-12);
    }

    #[test]
    fn mode_parse_and_display() {
        for mode in StrictnessMode::ALL {
            assert_eq!(mode.to_string().parse::<StrictnessMode>().unwrap(), mode);
        }
        assert_eq!(
            "STRICT".parse::<StrictnessMode>().unwrap(),
            StrictnessMode::Strict
        );
        assert!("lenient".parse::<StrictnessMode>().is_err());
    }

    #[test]
    fn confidence_is_zero_at_threshold() {
        for mode in StrictnessMode::ALL {
            let t = mode.profile().fill_threshold;
            let class = classify(&feature(t), mode);
            assert!(class.is_filled, "{mode}: ratio at threshold counts as filled");
            assert_eq!(class.confidence, 0.0, "{mode}");
        }
    }

    #[test]
    fn confidence_is_one_beyond_band() {
        for mode in StrictnessMode::ALL {
            let p = mode.profile();
            for ratio in [
                p.fill_threshold + p.tolerance_band,
                p.fill_threshold - p.tolerance_band,
                0.0,
                1.0,
            ] {
                assert_eq!(confidence_for(ratio, mode), 1.0, "{mode} at {ratio}");
            }
        }
    }

    #[test]
    fn confidence_is_monotone_in_distance() {
        for mode in StrictnessMode::ALL {
            let t = mode.profile().fill_threshold;
            let mut last = -1.0;
            for step in 0..=100 {
                let distance = step as f64 / 200.0;
                let above = confidence_for((t + distance).min(1.0), mode);
                let below = confidence_for((t - distance).max(0.0), mode);
                let c = above.min(below);
                assert!(c >= last, "{mode}: confidence dropped at distance {distance}");
                last = c;
            }
        }
    }

    #[test]
    fn mode_sensitivity() {
        let faint = feature(0.6);
        assert!(classify(&faint, StrictnessMode::Moderate).is_filled);
        assert!(!classify(&faint, StrictnessMode::Strict).is_filled);
        assert!(classify(&feature(0.35), StrictnessMode::Easy).is_filled);
    }
}
