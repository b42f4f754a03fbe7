use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture_cache::CaptureStrategy;
use crate::hue_mapper::MatchRule;
use crate::log_warn;

pub const APP_NAME: &str = "HueLens";
pub const DEFAULT_HUE: u16 = 210;

/// Application directories under `%APPDATA%`.
pub struct Config {
    pub app_data_dir: PathBuf,
    pub hue_path: PathBuf,
    pub settings_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn new() -> Result<Self> {
        let app_data = std::env::var("APPDATA")
            .context("Failed to get APPDATA environment variable")?;
        Self::with_root(PathBuf::from(app_data).join(APP_NAME))
    }

    pub fn with_root(app_data_dir: PathBuf) -> Result<Self> {
        let log_dir = app_data_dir.join("logs");

        fs::create_dir_all(&app_data_dir)
            .context("Failed to create app data directory")?;
        fs::create_dir_all(&log_dir)
            .context("Failed to create log directory")?;

        Ok(Self {
            hue_path: app_data_dir.join("hue.cfg"),
            settings_path: app_data_dir.join("settings.json"),
            log_dir,
            app_data_dir,
        })
    }
}

/// Target hue read from a `HUE=<0-359>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HueConfig {
    pub hue: u16,
}

impl Default for HueConfig {
    fn default() -> Self {
        Self { hue: DEFAULT_HUE }
    }
}

impl HueConfig {
    /// Parses the first meaningful line. Blank lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Result<Self> {
        let line = content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .context("Hue file has no HUE entry")?;

        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("Expected HUE=<0-359>, got '{}'", line))?;
        if !key.trim().eq_ignore_ascii_case("hue") {
            anyhow::bail!("Unknown key '{}'", key.trim());
        }

        let hue: u16 = value
            .trim()
            .parse()
            .with_context(|| format!("Hue '{}' is not a number", value.trim()))?;
        if hue >= 360 {
            anyhow::bail!("Hue {} is outside 0-359", hue);
        }

        Ok(Self { hue })
    }

    /// Reads the hue file once; any problem falls back to the default hue.
    pub fn load_or_default(path: &Path) -> Self {
        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hue file {}", path.display()))
            .and_then(|content| Self::parse(&content));

        match parsed {
            Ok(config) => config,
            Err(e) => {
                log_warn!("{:#}; using default hue {}", e, DEFAULT_HUE);
                Self::default()
            }
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    33
}

fn default_rescan_interval() -> u32 {
    10
}

fn default_zorder_refresh_interval() -> u32 {
    3
}

fn default_process_cache_reset() -> u32 {
    600
}

fn default_tracked_class() -> String {
    "XLMAIN".to_string()
}

fn default_ignored_processes() -> Vec<String> {
    vec!["SnippingTool.exe".to_string(), "ScreenClippingHost.exe".to_string()]
}

fn default_lock_timeout_ms() -> u64 {
    8
}

fn default_log_retention() -> usize {
    10
}

/// Pipeline tunables, optionally overridden by `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval: u32,
    #[serde(default = "default_zorder_refresh_interval")]
    pub zorder_refresh_interval: u32,
    #[serde(default = "default_process_cache_reset")]
    pub process_cache_reset_interval: u32,
    #[serde(default = "default_tracked_class")]
    pub tracked_class: String,
    #[serde(default)]
    pub title_contains: Option<String>,
    #[serde(default = "default_ignored_processes")]
    pub ignored_processes: Vec<String>,
    #[serde(default)]
    pub capture_strategy: CaptureStrategy,
    #[serde(default)]
    pub match_rule: MatchRule,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_log_retention")]
    pub log_retention_count: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            rescan_interval: default_rescan_interval(),
            zorder_refresh_interval: default_zorder_refresh_interval(),
            process_cache_reset_interval: default_process_cache_reset(),
            tracked_class: default_tracked_class(),
            title_contains: None,
            ignored_processes: default_ignored_processes(),
            capture_strategy: CaptureStrategy::default(),
            match_rule: MatchRule::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
            log_retention_count: default_log_retention(),
        }
    }
}

impl EngineSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: EngineSettings = serde_json::from_str(&content)
            .context("Failed to parse settings file")?;
        Ok(settings)
    }

    /// Missing file means defaults; a broken one is reported and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                log_warn!("{:#}; using default engine settings", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hue_line() {
        assert_eq!(HueConfig::parse("HUE=120").unwrap().hue, 120);
        assert_eq!(HueConfig::parse("# target\n\n  hue = 45 \n").unwrap().hue, 45);
        assert_eq!(HueConfig::parse("Hue=0").unwrap().hue, 0);
        assert_eq!(HueConfig::parse("HUE=359").unwrap().hue, 359);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(HueConfig::parse("").is_err());
        assert!(HueConfig::parse("# only a comment").is_err());
        assert!(HueConfig::parse("HUE=360").is_err());
        assert!(HueConfig::parse("HUE=-5").is_err());
        assert!(HueConfig::parse("HUE=blue").is_err());
        assert!(HueConfig::parse("COLOR=10").is_err());
        assert!(HueConfig::parse("HUE 10").is_err());
    }

    #[test]
    fn test_hue_file_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hue.cfg");
        assert_eq!(HueConfig::load_or_default(&path).hue, DEFAULT_HUE);

        fs::write(&path, "HUE=abc").unwrap();
        assert_eq!(HueConfig::load_or_default(&path).hue, DEFAULT_HUE);

        fs::write(&path, "HUE=90\n").unwrap();
        assert_eq!(HueConfig::load_or_default(&path).hue, 90);
    }

    #[test]
    fn test_settings_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "tick_interval_ms": 16, "capture_strategy": "WindowRender", "match_rule": { "min_value": 0.5 } }"#).unwrap();

        let settings = EngineSettings::load_or_default(&path);
        assert_eq!(settings.tick_interval_ms, 16);
        assert_eq!(settings.capture_strategy, CaptureStrategy::WindowRender);
        assert_eq!(settings.match_rule.min_value, 0.5);
        assert_eq!(settings.match_rule.min_saturation, 0.3);
        assert_eq!(settings.tracked_class, "XLMAIN");
        assert_eq!(settings.zorder_refresh_interval, 3);
    }

    #[test]
    fn test_settings_fallback_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(EngineSettings::load_or_default(&path), EngineSettings::default());

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(EngineSettings::load_or_default(&path), EngineSettings::default());

        let mut custom = EngineSettings::default();
        custom.ignored_processes.clear();
        custom.title_contains = Some("Budget".into());
        custom.save(&path).unwrap();
        assert_eq!(EngineSettings::load(&path).unwrap(), custom);
    }

    #[test]
    fn test_config_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path().join(APP_NAME)).unwrap();
        assert!(config.log_dir.is_dir());
        assert!(config.hue_path.ends_with("hue.cfg"));
        assert!(config.settings_path.ends_with("settings.json"));
    }
}
