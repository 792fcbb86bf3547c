//! # Time-of-day boost table
//!
//! A static, queryable multiplier table keyed by content type and time
//! bucket. The weekend table (by day-of-week) takes precedence over the
//! hour-of-day table when both define an entry for a content type; when
//! neither does, the multiplier is exactly 1.0.
//!
//! Applied by the engine as a post-multiplier after scoring, never as an
//! input to the weighted sum, so reweighting categories cannot defeat it.
//!
//! Loads from TOML or JSON with the usual fallback chain:
//! 1) `$FEED_BOOST_CONFIG_PATH`
//! 2) `config/time_boost.toml`
//! 3) `config/time_boost.json`
//! 4) built-in seed

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path, path::PathBuf};

pub const ENV_BOOST_CONFIG_PATH: &str = "FEED_BOOST_CONFIG_PATH";

/// Hour-of-day buckets. Boundaries follow the app's engagement curve:
/// morning 05–11, afternoon 12–16, evening 17–21, night otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeBucket::Morning,
            12..=16 => TimeBucket::Afternoon,
            17..=21 => TimeBucket::Evening,
            _ => TimeBucket::Night,
        }
    }
}

/// Per-bucket multipliers for one content type. Missing buckets mean
/// "no boost" for that bucket.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HourlyBoosts {
    pub morning: Option<f32>,
    pub afternoon: Option<f32>,
    pub evening: Option<f32>,
    pub night: Option<f32>,
}

impl HourlyBoosts {
    fn for_bucket(&self, bucket: TimeBucket) -> Option<f32> {
        match bucket {
            TimeBucket::Morning => self.morning,
            TimeBucket::Afternoon => self.afternoon,
            TimeBucket::Evening => self.evening,
            TimeBucket::Night => self.night,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeBoostTable {
    /// Hour-of-day table, keyed by normalized content type.
    #[serde(default)]
    pub hourly: HashMap<String, HourlyBoosts>,
    /// Weekend override, keyed by normalized content type.
    #[serde(default)]
    pub weekend: HashMap<String, f32>,
}

impl TimeBoostTable {
    /// Multiplier for `content_type` at `ts`. Defaults to exactly 1.0.
    pub fn boost(&self, content_type: &str, ts: DateTime<Utc>) -> f32 {
        let key = normalize(content_type);

        if is_weekend(ts.weekday()) {
            if let Some(&m) = self.weekend.get(&key) {
                return sane_multiplier(m);
            }
        }

        let bucket = TimeBucket::from_hour(ts.hour());
        if let Some(hb) = self.hourly.get(&key) {
            if let Some(m) = hb.for_bucket(bucket) {
                return sane_multiplier(m);
            }
        }

        1.0
    }

    /// Load from an explicit path (TOML or JSON by extension). Any
    /// failure falls back to the built-in seed with a warning.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| {
                let ext = path
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let table: TimeBoostTable = match ext.as_str() {
                    "json" => serde_json::from_str(&content)?,
                    _ => toml::from_str(&content)?,
                };
                Ok(table)
            });
        match parsed {
            Ok(t) => t.normalized(),
            Err(e) => {
                tracing::warn!("time boost table load failed ({}), using seed: {e:#}", path.display());
                Self::default_seed()
            }
        }
    }

    /// Load using env var + fallbacks.
    pub fn load_default() -> Self {
        if let Ok(p) = std::env::var(ENV_BOOST_CONFIG_PATH) {
            return Self::load_from_file(PathBuf::from(p));
        }
        let toml_p = PathBuf::from("config/time_boost.toml");
        if toml_p.exists() {
            return Self::load_from_file(toml_p);
        }
        let json_p = PathBuf::from("config/time_boost.json");
        if json_p.exists() {
            return Self::load_from_file(json_p);
        }
        Self::default_seed()
    }

    /// Built-in seed for the app's content types.
    pub fn default_seed() -> Self {
        let mut hourly = HashMap::new();
        hourly.insert(
            "prayer".to_string(),
            HourlyBoosts {
                morning: Some(1.3),
                night: Some(1.2),
                ..Default::default()
            },
        );
        hourly.insert(
            "devotional".to_string(),
            HourlyBoosts {
                morning: Some(1.25),
                ..Default::default()
            },
        );
        hourly.insert(
            "event".to_string(),
            HourlyBoosts {
                evening: Some(1.2),
                ..Default::default()
            },
        );
        hourly.insert(
            "post".to_string(),
            HourlyBoosts {
                evening: Some(1.1),
                ..Default::default()
            },
        );

        let mut weekend = HashMap::new();
        weekend.insert("event".to_string(), 1.3);
        weekend.insert("post".to_string(), 1.05);

        Self { hourly, weekend }
    }

    /// An empty table: every lookup yields 1.0.
    pub fn disabled() -> Self {
        Self {
            hourly: HashMap::new(),
            weekend: HashMap::new(),
        }
    }

    fn normalized(self) -> Self {
        let hourly = self
            .hourly
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        let weekend = self
            .weekend
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        Self { hourly, weekend }
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Lowercase + trim so config keys and caller input meet in the middle.
fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// A boost multiplier must be positive and finite; anything else is a
/// config mistake and reads as "no effect".
fn sane_multiplier(m: f32) -> f32 {
    if m.is_finite() && m > 0.0 {
        m
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 30, 0).unwrap()
    }

    #[test]
    fn unknown_content_type_is_exactly_one() {
        let t = TimeBoostTable::default_seed();
        // 2025-06-04 is a Wednesday.
        assert_eq!(t.boost("unknown-kind", at(2025, 6, 4, 9)), 1.0);
    }

    #[test]
    fn hourly_bucket_lookup() {
        let t = TimeBoostTable::default_seed();
        let morning = t.boost("prayer", at(2025, 6, 4, 7));
        let afternoon = t.boost("prayer", at(2025, 6, 4, 14));
        assert!(morning > 1.0);
        assert_eq!(afternoon, 1.0);
    }

    #[test]
    fn weekend_override_wins_over_hour() {
        let t = TimeBoostTable::default_seed();
        // 2025-06-07 is a Saturday; evening would give event 1.2, the
        // weekend table says 1.3.
        let m = t.boost("event", at(2025, 6, 7, 19));
        assert!((m - 1.3).abs() < 1e-6);
    }

    #[test]
    fn weekend_without_entry_falls_through_to_hourly() {
        let t = TimeBoostTable::default_seed();
        // prayer has no weekend entry; Saturday morning uses hourly.
        let m = t.boost("prayer", at(2025, 6, 7, 7));
        assert!((m - 1.3).abs() < 1e-6);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let t = TimeBoostTable::default_seed();
        let a = t.boost("Prayer", at(2025, 6, 4, 7));
        let b = t.boost("  prayer ", at(2025, 6, 4, 7));
        assert_eq!(a, b);
    }

    #[test]
    fn disabled_table_is_identity() {
        let t = TimeBoostTable::disabled();
        assert_eq!(t.boost("prayer", at(2025, 6, 7, 7)), 1.0);
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(TimeBucket::from_hour(4), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(11), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(12), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(17), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(22), TimeBucket::Night);
    }
}
