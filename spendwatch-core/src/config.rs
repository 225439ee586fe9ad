//! TOML application configuration.
//!
//! Every section has defaults, so an empty file is a valid config. Relative
//! paths are resolved against the directory of the config file.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::allowlist::{Allowlist, AllowlistError, AllowlistFile};
use crate::data::store::MergePolicy;

pub const DEFAULT_API_URL: &str = "https://api.spending.gov.ua/api/v2/api/transactions/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Allowlist(#[from] AllowlistError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
    pub reports: ReportsConfig,
    pub allowlist: AllowlistConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Canonical dataset location shared by the ingester and the reports.
    pub dataset_path: PathBuf,
    /// Last-processed-date record used by the scheduler.
    pub state_path: PathBuf,
    pub merge_policy: MergePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("dataset/transactiondata_full.csv"),
            state_path: PathBuf::from("dataset/run_state.json"),
            merge_policy: MergePolicy::Append,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wall-clock fire time, `HH:MM` or `HH:MM:SS`.
    pub fire_at: String,
    pub poll_interval_secs: u64,
    /// Run a missed firing on startup.
    pub catch_up: bool,
    /// Lock files older than this are considered abandoned.
    pub stale_lock_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fire_at: "20:00".to_string(),
            poll_interval_secs: 60,
            catch_up: true,
            stale_lock_secs: 6 * 60 * 60,
        }
    }
}

impl ScheduleConfig {
    pub fn fire_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_fire_time(&self.fire_at)
            .ok_or_else(|| ConfigError::Invalid(format!("unparseable fire_at '{}'", self.fire_at)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stale_lock_age(&self) -> Duration {
        Duration::from_secs(self.stale_lock_secs)
    }
}

fn parse_fire_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Case-insensitive substrings of `payment_details` marking defense spending.
    pub defense_keywords: Vec<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            defense_keywords: ["ЗСУ", "військов", "оборон", "дрон", "БПЛА", "тероборон"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Where the allowlist comes from: a separate TOML file, inline codes, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowlistConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("allowlist.toml")),
            codes: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load and validate a config file, resolving relative paths against its directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a config from a TOML string. Paths are left as written.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url is empty".into()));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be > 0".into()));
        }
        if self.schedule.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule.poll_interval_secs must be > 0".into(),
            ));
        }
        self.schedule.fire_time()?;
        if self.allowlist.file.is_none() && self.allowlist.codes.is_empty() {
            return Err(ConfigError::Invalid(
                "allowlist needs a file or inline codes".into(),
            ));
        }
        Ok(())
    }

    /// Rebase relative paths onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.store.dataset_path);
        rebase(&mut self.store.state_path);
        if let Some(file) = self.allowlist.file.as_mut() {
            rebase(file);
        }
    }

    /// Build the allowlist from the configured file and inline codes.
    pub fn load_allowlist(&self) -> Result<Allowlist, ConfigError> {
        let mut file = match &self.allowlist.file {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| AllowlistError::Read {
                        path: path.display().to_string(),
                        source,
                    })?;
                toml::from_str::<AllowlistFile>(&content).map_err(AllowlistError::from)?
            }
            None => AllowlistFile::default(),
        };
        file.codes.extend(self.allowlist.codes.iter().cloned());
        Ok(Allowlist::from_allowlist_file(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.schedule.fire_time().unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap()
        );
        assert_eq!(config.store.merge_policy, MergePolicy::Append);
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
[api]
timeout_secs = 5

[store]
dataset_path = "/var/lib/spendwatch/data.csv"
merge_policy = "skip_duplicates"

[schedule]
fire_at = "06:30:15"
poll_interval_secs = 10

[allowlist]
codes = ["04358000"]
"#,
        )
        .unwrap();
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.store.merge_policy, MergePolicy::SkipDuplicates);
        assert_eq!(
            config.schedule.fire_time().unwrap(),
            NaiveTime::from_hms_opt(6, 30, 15).unwrap()
        );
        assert_eq!(config.allowlist.codes, vec!["04358000".to_string()]);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[schedule]\nfire_at = \"25:99\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[schedule]\npoll_interval_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[api]\ntimeout_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[store]\nmerge_policy = \"upsert\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spendwatch.toml");
        std::fs::write(&path, "[allowlist]\nfile = \"lists/allow.toml\"\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(
            config.store.dataset_path,
            dir.path().join("dataset/transactiondata_full.csv")
        );
        assert_eq!(
            config.allowlist.file.as_deref(),
            Some(dir.path().join("lists/allow.toml").as_path())
        );
    }

    #[test]
    fn allowlist_combines_file_and_inline_codes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("allowlist.toml"),
            "codes = [\"04358000\", \"33800777\"]\n",
        )
        .unwrap();
        let path = dir.path().join("spendwatch.toml");
        std::fs::write(&path, "[allowlist]\nfile = \"allowlist.toml\"\ncodes = [\"4360623\"]\n")
            .unwrap();

        let allowlist = AppConfig::from_file(&path).unwrap().load_allowlist().unwrap();
        assert_eq!(allowlist.len(), 3);
        assert!(allowlist.contains(&"04360623".parse().unwrap()));
    }

    #[test]
    fn missing_allowlist_file_is_an_error() {
        let config = AppConfig::from_toml("[allowlist]\nfile = \"/nonexistent/allow.toml\"").unwrap();
        assert!(matches!(
            config.load_allowlist(),
            Err(ConfigError::Allowlist(AllowlistError::Read { .. }))
        ));
    }
}
