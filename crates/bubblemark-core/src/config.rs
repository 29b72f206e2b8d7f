//! Runtime configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::evaluation::EvaluateOptions;
use crate::policy::StrictnessMode;
use crate::scoring::{ScoringOptions, DEFAULT_FLAG_THRESHOLD, DEFAULT_TARGET_FLAG_RATE};
use crate::sheet::ThresholdStrategy;

/// Top-level bubblemark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubblemarkConfig {
    /// Strictness mode used when none is given on the command line.
    #[serde(default)]
    pub default_mode: StrictnessMode,
    /// Questions with confidence below this are flagged.
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,
    /// Expected fraction of flagged questions (logged, not enforced).
    #[serde(default = "default_target_flag_rate")]
    pub target_flag_rate: f64,
    /// Max sheets evaluated concurrently in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Wall-clock limit per sheet in a batch.
    #[serde(default = "default_sheet_timeout")]
    pub sheet_timeout_ms: u64,
    /// Output directory for results.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Binarization threshold strategy.
    #[serde(default)]
    pub threshold: ThresholdStrategy,
}

fn default_flag_threshold() -> f64 {
    DEFAULT_FLAG_THRESHOLD
}
fn default_target_flag_rate() -> f64 {
    DEFAULT_TARGET_FLAG_RATE
}
fn default_parallelism() -> usize {
    4
}
fn default_sheet_timeout() -> u64 {
    10_000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./bubblemark-results")
}

impl Default for BubblemarkConfig {
    fn default() -> Self {
        Self {
            default_mode: StrictnessMode::default(),
            flag_threshold: default_flag_threshold(),
            target_flag_rate: default_target_flag_rate(),
            parallelism: default_parallelism(),
            sheet_timeout_ms: default_sheet_timeout(),
            output_dir: default_output_dir(),
            threshold: ThresholdStrategy::default(),
        }
    }
}

impl BubblemarkConfig {
    pub fn scoring_options(&self) -> ScoringOptions {
        ScoringOptions {
            flag_threshold: self.flag_threshold,
            target_flag_rate: self.target_flag_rate,
        }
    }

    pub fn evaluate_options(&self) -> EvaluateOptions {
        EvaluateOptions {
            threshold: self.threshold,
            scoring: self.scoring_options(),
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.flag_threshold),
            "flag_threshold must be within [0, 1], got {}",
            self.flag_threshold
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.target_flag_rate),
            "target_flag_rate must be within [0, 1], got {}",
            self.target_flag_rate
        );
        anyhow::ensure!(self.parallelism > 0, "parallelism must be at least 1");
        anyhow::ensure!(self.sheet_timeout_ms > 0, "sheet_timeout_ms must be positive");
        Ok(())
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `bubblemark.toml` in the current directory
/// 2. `~/.config/bubblemark/config.toml`
///
/// Environment variable overrides: `BUBBLEMARK_MODE`, `BUBBLEMARK_PARALLELISM`,
/// `BUBBLEMARK_FLAG_THRESHOLD`.
pub fn load_config() -> Result<BubblemarkConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<BubblemarkConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("bubblemark.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<BubblemarkConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => BubblemarkConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Apply `BUBBLEMARK_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    config: &mut BubblemarkConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(mode) = lookup("BUBBLEMARK_MODE") {
        config.default_mode = mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("invalid BUBBLEMARK_MODE")?;
    }
    if let Some(parallelism) = lookup("BUBBLEMARK_PARALLELISM") {
        config.parallelism = parallelism
            .trim()
            .parse()
            .with_context(|| format!("invalid BUBBLEMARK_PARALLELISM: {parallelism:?}"))?;
    }
    if let Some(threshold) = lookup("BUBBLEMARK_FLAG_THRESHOLD") {
        config.flag_threshold = threshold
            .trim()
            .parse()
            .with_context(|| format!("invalid BUBBLEMARK_FLAG_THRESHOLD: {threshold:?}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("bubblemark"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = BubblemarkConfig::default();
        assert_eq!(config.default_mode, StrictnessMode::Moderate);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.flag_threshold, 0.5);
        assert_eq!(config.threshold, ThresholdStrategy::Otsu);
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
default_mode = "strict"
parallelism = 8
threshold = { fixed = 140 }
"#;
        let config: BubblemarkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_mode, StrictnessMode::Strict);
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.threshold, ThresholdStrategy::Fixed(140));
        assert_eq!(config.sheet_timeout_ms, 10_000);
        assert_eq!(config.output_dir, PathBuf::from("./bubblemark-results"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "flag_threshold = 0.7\nthreshold = \"otsu\"\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.flag_threshold, 0.7);
        assert_eq!(config.scoring_options().flag_threshold, 0.7);
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/bubblemark.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "flag_threshold = 1.5\n").unwrap();
        assert!(load_config_from(Some(&path)).is_err());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BUBBLEMARK_MODE", "easy"),
            ("BUBBLEMARK_PARALLELISM", "2"),
            ("BUBBLEMARK_FLAG_THRESHOLD", "0.25"),
        ]
        .into_iter()
        .collect();
        let mut config = BubblemarkConfig::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.default_mode, StrictnessMode::Easy);
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.flag_threshold, 0.25);
    }

    #[test]
    fn bad_env_override_is_error() {
        let mut config = BubblemarkConfig::default();
        let err = apply_env_overrides(&mut config, |name| {
            (name == "BUBBLEMARK_PARALLELISM").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("BUBBLEMARK_PARALLELISM"));
    }
}
