//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/urivstat/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/urivstat/` (~/.config/urivstat/)
//! - Data: `$XDG_DATA_HOME/urivstat/` (~/.local/share/urivstat/)
//! - State/Logs: `$XDG_STATE_HOME/urivstat/` (~/.local/state/urivstat/)

use crate::error::{Error, Result};
use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Session, streak and window settings
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Extra email canonicalization rules
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Input database and export locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the "current streak" count is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreakAnchor {
    /// Count back from the reference date; zero if that date is inactive
    #[default]
    Today,
    /// Count back from the most recent active date, wherever it falls
    LastActive,
}

impl StreakAnchor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakAnchor::Today => "today",
            StreakAnchor::LastActive => "last_active",
        }
    }
}

impl std::str::FromStr for StreakAnchor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "today" => Ok(StreakAnchor::Today),
            "last_active" | "last-active" => Ok(StreakAnchor::LastActive),
            _ => Err(format!("unknown streak anchor: {}", s)),
        }
    }
}

/// Upper bound for the trailing activity windows (about ten years)
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// Aggregation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    /// Minutes of inactivity that close a session
    #[serde(default = "default_session_gap_minutes")]
    pub session_gap_minutes: u32,

    /// Offset of the reference timezone used for calendar dates (minutes east of UTC)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Anchor for the current streak
    #[serde(default)]
    pub current_streak: StreakAnchor,

    /// Keep admin identities in the general per-identity tables
    #[serde(default)]
    pub include_admins: bool,

    /// Length of the short trailing activity window in days
    #[serde(default = "default_window_short_days")]
    pub window_short_days: u32,

    /// Length of the long trailing activity window in days
    #[serde(default = "default_window_long_days")]
    pub window_long_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            session_gap_minutes: default_session_gap_minutes(),
            utc_offset_minutes: default_utc_offset_minutes(),
            current_streak: StreakAnchor::default(),
            include_admins: false,
            window_short_days: default_window_short_days(),
            window_long_days: default_window_long_days(),
        }
    }
}

impl AnalyticsConfig {
    /// Inactivity threshold as a duration.
    pub fn session_gap(&self) -> Duration {
        Duration::minutes(i64::from(self.session_gap_minutes))
    }

    /// Reference timezone for date bucketing and naive timestamps.
    pub fn reference_offset(&self) -> Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::Config(format!(
                    "analytics.utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.session_gap_minutes == 0 {
            return Err(Error::Config(
                "analytics.session_gap_minutes must be positive".to_string(),
            ));
        }
        if self.window_short_days == 0 || self.window_long_days == 0 {
            return Err(Error::Config(
                "analytics window lengths must be positive".to_string(),
            ));
        }
        if self.window_short_days > MAX_WINDOW_DAYS || self.window_long_days > MAX_WINDOW_DAYS {
            return Err(Error::Config(format!(
                "analytics window lengths must not exceed {} days",
                MAX_WINDOW_DAYS
            )));
        }
        self.reference_offset()?;
        Ok(())
    }

    /// Apply command-line overrides for one run.
    pub fn apply(&mut self, overrides: &AnalyticsOverrides) {
        if let Some(minutes) = overrides.session_gap_minutes {
            self.session_gap_minutes = minutes;
        }
        if let Some(anchor) = overrides.current_streak {
            self.current_streak = anchor;
        }
        if overrides.include_admins {
            self.include_admins = true;
        }
    }
}

/// Per-run overrides of [`AnalyticsConfig`], usually from CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticsOverrides {
    pub session_gap_minutes: Option<u32>,
    pub current_streak: Option<StreakAnchor>,
    pub include_admins: bool,
}

fn default_session_gap_minutes() -> u32 {
    30
}

fn default_utc_offset_minutes() -> i32 {
    9 * 60
}

fn default_window_short_days() -> u32 {
    7
}

fn default_window_long_days() -> u32 {
    30
}

/// Additional canonicalization rules merged over the built-in provider tables
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IdentityConfig {
    /// Domains whose local part ignores dots
    #[serde(default)]
    pub dotless_domains: Vec<String>,

    /// Domains that support `local+tag` sub-addressing
    #[serde(default)]
    pub subaddress_domains: Vec<String>,

    /// Alias domain → canonical domain
    #[serde(default)]
    pub domain_aliases: HashMap<String, String>,
}

/// Input and output locations
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PathsConfig {
    /// SQLite database to snapshot
    pub database: Option<PathBuf>,

    /// Root directory for timestamped snapshot exports
    pub export_root: Option<PathBuf>,
}

impl PathsConfig {
    /// Configured export root, or `$XDG_DATA_HOME/urivstat/exports`
    pub fn export_root(&self) -> PathBuf {
        self.export_root
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("exports"))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.analytics.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/urivstat/config.toml` (~/.config/urivstat/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("urivstat").join("config.toml")
    }

    /// Returns the data directory path (default export root lives here)
    ///
    /// `$XDG_DATA_HOME/urivstat/` (~/.local/share/urivstat/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("urivstat")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/urivstat/` (~/.local/state/urivstat/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("urivstat")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/urivstat/urivstat.log` (~/.local/state/urivstat/urivstat.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("urivstat.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analytics.session_gap_minutes, 30);
        assert_eq!(config.analytics.utc_offset_minutes, 540);
        assert_eq!(config.analytics.current_streak, StreakAnchor::Today);
        assert!(!config.analytics.include_admins);
        assert!(config.analytics.validate().is_ok());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[analytics]
session_gap_minutes = 45
utc_offset_minutes = 0
current_streak = "last_active"

[identity]
dotless_domains = ["example.edu"]

[identity.domain_aliases]
"old.example.edu" = "example.edu"

[paths]
database = "/var/lib/uriv/uriv.db"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.analytics.session_gap_minutes, 45);
        assert_eq!(config.analytics.session_gap(), Duration::minutes(45));
        assert_eq!(config.analytics.current_streak, StreakAnchor::LastActive);
        assert_eq!(config.analytics.window_long_days, 30);
        assert_eq!(config.identity.dotless_domains, vec!["example.edu"]);
        assert_eq!(
            config.identity.domain_aliases.get("old.example.edu").map(String::as_str),
            Some("example.edu")
        );
        assert_eq!(
            config.paths.database.as_deref(),
            Some(Path::new("/var/lib/uriv/uriv.db"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_analytics_validation() {
        let config = AnalyticsConfig {
            session_gap_minutes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalyticsConfig {
            utc_offset_minutes: 25 * 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalyticsConfig {
            window_long_days: MAX_WINDOW_DAYS + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = AnalyticsConfig {
            window_short_days: u32::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalyticsConfig {
            window_long_days: MAX_WINDOW_DAYS,
            utc_offset_minutes: -(23 * 60 + 59),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reference_offset_overflow_is_rejected() {
        for minutes in [i32::MAX, i32::MIN, 24 * 60, -24 * 60] {
            let config = AnalyticsConfig {
                utc_offset_minutes: minutes,
                ..Default::default()
            };
            assert!(matches!(config.reference_offset(), Err(Error::Config(_))));
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_streak_anchor_from_str() {
        assert_eq!("today".parse::<StreakAnchor>(), Ok(StreakAnchor::Today));
        assert_eq!(
            "last-active".parse::<StreakAnchor>(),
            Ok(StreakAnchor::LastActive)
        );
        assert!("yesterday".parse::<StreakAnchor>().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AnalyticsConfig::default();
        config.apply(&AnalyticsOverrides::default());
        assert_eq!(config.session_gap_minutes, 30);

        config.apply(&AnalyticsOverrides {
            session_gap_minutes: Some(10),
            current_streak: Some(StreakAnchor::LastActive),
            include_admins: true,
        });
        assert_eq!(config.session_gap_minutes, 10);
        assert_eq!(config.current_streak, StreakAnchor::LastActive);
        assert!(config.include_admins);
    }

    #[test]
    fn test_reference_offset() {
        let config = AnalyticsConfig::default();
        let offset = config.reference_offset().unwrap();
        assert_eq!(offset.local_minus_utc(), 9 * 3600);
    }
}
