//! # Scoring configuration
//!
//! One named, immutable set of scoring parameters: category weights,
//! per-signal scale constants, recency-decay parameters, anti-farm
//! parameters, and ranking limits.
//!
//! Loads from TOML or JSON with the usual fallback chain:
//! 1) `$FEED_SCORING_CONFIG_PATH`
//! 2) `config/scoring.toml`
//! 3) `config/scoring.json`
//! 4) built-in defaults
//!
//! Changing any field changes the derived `version()` tag, which is
//! carried on every computed score so stale cached scores can be told
//! apart from current ones.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SCORING_CONFIG_PATH: &str = "FEED_SCORING_CONFIG_PATH";

/// Relative category weights for the weighted sum. They need not sum
/// to 1; the scorer normalizes by the weight total.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub recency: f32,
    pub replies: f32,
    pub bookmarks: f32,
    pub reposts: f32,
    pub likes: f32,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            recency: 0.30,
            replies: 0.30,
            bookmarks: 0.15,
            reposts: 0.10,
            likes: 0.15,
        }
    }
}

/// Per-signal saturation counts for `log_norm`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalScales {
    pub replies: u32,
    pub bookmarks: u32,
    pub reposts: u32,
    pub likes: u32,
}

impl Default for SignalScales {
    fn default() -> Self {
        Self {
            replies: 25,
            bookmarks: 15,
            reposts: 10,
            likes: 50,
        }
    }
}

/// Recency-decay parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayParams {
    pub half_life_hours: f32,
    pub recency_floor: f32,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            half_life_hours: 24.0,
            recency_floor: 0.05,
        }
    }
}

/// Anti-farm parameters. Tunable defaults; none of the literals are
/// load-bearing for correctness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AntiFarmParams {
    /// Accounts younger than this (days) get `new_account_multiplier`.
    pub min_account_age_days: f32,
    /// Down-weight for young accounts, in (0, 1].
    pub new_account_multiplier: f32,
    /// Ratio check only fires above this many net likes.
    pub suspicious_like_threshold: u32,
    /// Minimum plausible `unique_repliers / net_likes`.
    pub suspicious_ratio: f32,
    /// Down-weight applied when the ratio check fires, in (0, 1].
    pub suspicious_penalty: f32,
}

impl Default for AntiFarmParams {
    fn default() -> Self {
        Self {
            min_account_age_days: 7.0,
            new_account_multiplier: 0.6,
            suspicious_like_threshold: 10,
            suspicious_ratio: 0.05,
            suspicious_penalty: 0.3,
        }
    }
}

/// Ranking and candidate-fetch limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingParams {
    /// Per-author cap inside one ranked set.
    pub max_per_author: usize,
    /// Absolute floor: scores below this are discarded as noise.
    pub min_score_floor: f32,
    /// Candidate window (days back from now).
    pub candidate_window_days: i64,
    /// Hard cap on candidates fetched per request.
    pub candidate_cap: usize,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            max_per_author: 3,
            min_score_floor: 0.01,
            candidate_window_days: 7,
            candidate_cap: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub weights: CategoryWeights,
    #[serde(default)]
    pub scales: SignalScales,
    #[serde(default)]
    pub decay: DecayParams,
    #[serde(default)]
    pub anti_farm: AntiFarmParams,
    #[serde(default)]
    pub ranking: RankingParams,
}

fn default_label() -> String {
    "default".to_string()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            weights: CategoryWeights::default(),
            scales: SignalScales::default(),
            decay: DecayParams::default(),
            anti_farm: AntiFarmParams::default(),
            ranking: RankingParams::default(),
        }
    }
}

impl ScoringConfig {
    /// Version tag: label plus a short fingerprint of every parameter.
    /// Two configs differing in any field produce different tags.
    pub fn version(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(8);
        for b in digest.iter().take(4) {
            hex.push_str(&format!("{b:02x}"));
        }
        format!("{}-{}", self.label, hex)
    }

    /// Parameter hygiene, same spirit as the anti-spam param clamping:
    /// nonsense values are pulled back to something safe rather than
    /// rejected.
    pub fn sanitize(mut self) -> Self {
        let w = &mut self.weights;
        for v in [
            &mut w.recency,
            &mut w.replies,
            &mut w.bookmarks,
            &mut w.reposts,
            &mut w.likes,
        ] {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }

        let s = &mut self.scales;
        for v in [&mut s.replies, &mut s.bookmarks, &mut s.reposts, &mut s.likes] {
            if *v == 0 {
                *v = 1;
            }
        }

        let d = &mut self.decay;
        if !d.half_life_hours.is_finite() || d.half_life_hours <= 0.0 {
            d.half_life_hours = DecayParams::default().half_life_hours;
        }
        d.recency_floor = d.recency_floor.clamp(0.0, 1.0);

        let af = &mut self.anti_farm;
        if !af.min_account_age_days.is_finite() || af.min_account_age_days < 0.0 {
            af.min_account_age_days = 0.0;
        }
        af.suspicious_ratio = af.suspicious_ratio.clamp(0.0, 1.0);
        for v in [&mut af.new_account_multiplier, &mut af.suspicious_penalty] {
            // Penalties down-rank, never erase: keep them strictly positive.
            if !v.is_finite() || *v <= 0.0 || *v > 1.0 {
                *v = 1.0;
            }
        }

        let r = &mut self.ranking;
        if r.max_per_author == 0 {
            r.max_per_author = 1;
        }
        r.min_score_floor = r.min_score_floor.clamp(0.0, 1.0);
        if r.candidate_window_days <= 0 {
            r.candidate_window_days = RankingParams::default().candidate_window_days;
        }
        if r.candidate_cap == 0 {
            r.candidate_cap = RankingParams::default().candidate_cap;
        }

        self
    }

    /// Load from an explicit path. Supports TOML or JSON by extension.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scoring config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: ScoringConfig = match ext.as_str() {
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("parsing {} as JSON", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("parsing {} as TOML", path.display()))?,
        };
        Ok(cfg.sanitize())
    }

    /// Load using env var + fallbacks; any failure falls back to
    /// defaults with a warning rather than taking the service down.
    pub fn load_default() -> Self {
        match Self::try_load_default() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("scoring config load failed, using defaults: {e:#}");
                Self::default()
            }
        }
    }

    fn try_load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SCORING_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!(
                "{ENV_SCORING_CONFIG_PATH} points to non-existent path"
            ));
        }
        let toml_p = PathBuf::from("config/scoring.toml");
        if toml_p.exists() {
            return Self::load_from_file(&toml_p);
        }
        let json_p = PathBuf::from("config/scoring.json");
        if json_p.exists() {
            return Self::load_from_file(&json_p);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_stable_for_identical_configs() {
        let a = ScoringConfig::default();
        let b = ScoringConfig::default();
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn version_changes_with_any_field() {
        let a = ScoringConfig::default();
        let mut b = ScoringConfig::default();
        b.decay.half_life_hours = 48.0;
        assert_ne!(a.version(), b.version());

        let mut c = ScoringConfig::default();
        c.weights.likes = 0.2;
        assert_ne!(a.version(), c.version());
    }

    #[test]
    fn version_carries_label() {
        let mut cfg = ScoringConfig::default();
        cfg.label = "experiment".into();
        assert!(cfg.version().starts_with("experiment-"));
    }

    #[test]
    fn sanitize_repairs_nonsense() {
        let mut cfg = ScoringConfig::default();
        cfg.weights.likes = -3.0;
        cfg.scales.replies = 0;
        cfg.decay.half_life_hours = -1.0;
        cfg.anti_farm.suspicious_penalty = 0.0;
        cfg.ranking.max_per_author = 0;
        let cfg = cfg.sanitize();
        assert_eq!(cfg.weights.likes, 0.0);
        assert_eq!(cfg.scales.replies, 1);
        assert!(cfg.decay.half_life_hours > 0.0);
        assert_eq!(cfg.anti_farm.suspicious_penalty, 1.0);
        assert_eq!(cfg.ranking.max_per_author, 1);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_override_wins() {
        use std::io::Write;

        // Unique temp file so parallel test binaries cannot collide.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("scoring_{nanos}.toml"));
        {
            let mut f = fs::File::create(&path).unwrap();
            write!(f, "label = \"from-env\"").unwrap();
            f.sync_all().unwrap();
        }

        std::env::set_var(ENV_SCORING_CONFIG_PATH, &path);
        let cfg = ScoringConfig::load_default();
        std::env::remove_var(ENV_SCORING_CONFIG_PATH);

        assert_eq!(cfg.label, "from-env");
        let _ = fs::remove_file(&path);
    }

    #[serial_test::serial]
    #[test]
    fn dangling_env_path_falls_back_to_defaults() {
        std::env::set_var(ENV_SCORING_CONFIG_PATH, "/definitely/not/here.toml");
        let cfg = ScoringConfig::load_default();
        std::env::remove_var(ENV_SCORING_CONFIG_PATH);
        assert_eq!(cfg.label, "default");
    }

    #[test]
    fn toml_roundtrip_with_partial_file() {
        let toml = r#"
            label = "lean"

            [weights]
            recency = 0.5
            replies = 0.2
            bookmarks = 0.1
            reposts = 0.1
            likes = 0.1
        "#;
        let cfg: ScoringConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.label, "lean");
        assert!((cfg.weights.recency - 0.5).abs() < 1e-6);
        // Unspecified sections come from defaults.
        assert_eq!(cfg.scales.likes, SignalScales::default().likes);
    }
}
