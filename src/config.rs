use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Audience, SortType};
use crate::pager::{FeedQuery, DEFAULT_PAGE_SIZE};

const DEFAULT_ENV_PREFIX: &str = "TOXIQ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_share_base")]
    pub share_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            share_base: default_share_base(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("toxiq/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_share_base() -> String {
    crate::thread::DEFAULT_SHARE_BASE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_sort")]
    pub sort: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            audience: default_audience(),
            sort: default_sort(),
        }
    }
}

impl FeedConfig {
    pub fn query(&self) -> Result<FeedQuery> {
        let audience: Audience = self
            .audience
            .parse()
            .map_err(|err: String| anyhow!("config: feed.audience: {err}"))?;
        let sort: SortType = self
            .sort
            .parse()
            .map_err(|err: String| anyhow!("config: feed.sort: {err}"))?;
        Ok(FeedQuery { audience, sort })
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_audience() -> String {
    Audience::default().to_string()
}

fn default_sort() -> String {
    SortType::default().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }
    if !other.api.share_base.is_empty() {
        base.api.share_base = other.api.share_base;
    }

    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    if !other.feed.audience.is_empty() {
        base.feed.audience = other.feed.audience;
    }
    if !other.feed.sort.is_empty() {
        base.feed.sort = other.feed.sort;
    }

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    if !other.logging.filter.is_empty() {
        base.logging.filter = other.logging.filter;
    }

    base
}

/// Applies `PREFIX_SECTION__KEY` variables on top of `cfg`. Unset keys keep
/// whatever the file provided.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let map: HashMap<String, String> = env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect();

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => match humantime::parse_duration(&value) {
            Ok(duration) => cfg.api.timeout = duration,
            Err(err) => tracing::warn!(key, error = %err, "ignoring invalid duration"),
        },
        "api.share_base" => cfg.api.share_base = value,
        "feed.page_size" => match value.parse::<u32>() {
            Ok(parsed) if parsed > 0 => cfg.feed.page_size = parsed,
            _ => tracing::warn!(key, value = %value, "ignoring invalid page size"),
        },
        "feed.audience" => cfg.feed.audience = value,
        "feed.sort" => cfg.feed.sort = value,
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "logging.filter" => cfg.logging.filter = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("toxiq").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(prefix: &str) -> LoadOptions {
        let dir = tempdir().unwrap();
        LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some(prefix.into()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated("TOXIQ_TEST_DEFAULTS")).unwrap();
        assert_eq!(cfg.api.base_url, crate::api::DEFAULT_BASE_URL);
        assert_eq!(cfg.api.timeout, Duration::from_secs(20));
        assert_eq!(cfg.feed.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(cfg.logging.filter, "warn");
        let query = cfg.feed.query().unwrap();
        assert_eq!((query.audience, query.sort), (Audience::All, SortType::New));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: http://localhost:9000/api/\n  timeout: 5s\nfeed:\n  audience: friends\n  sort: top\n  page_size: 25\nstorage:\n  path: /tmp/toxiq.db\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("TOXIQ_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:9000/api/");
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.api.share_base, crate::thread::DEFAULT_SHARE_BASE);
        assert_eq!(cfg.feed.page_size, 25);
        assert_eq!(cfg.storage.path, Some(PathBuf::from("/tmp/toxiq.db")));
        let query = cfg.feed.query().unwrap();
        assert_eq!((query.audience, query.sort), (Audience::Friends, SortType::Top));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "api: [not, a, map]\n").unwrap();
        let err = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("TOXIQ_TEST_BAD".into()),
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn env_overrides() {
        env::set_var("TOXIQ_TEST_ENV_FEED__SORT", "hot");
        env::set_var("TOXIQ_TEST_ENV_API__TIMEOUT", "3s");
        env::set_var("TOXIQ_TEST_ENV_FEED__PAGE_SIZE", "zero");
        let cfg = load(isolated("TOXIQ_TEST_ENV")).unwrap();
        env::remove_var("TOXIQ_TEST_ENV_FEED__SORT");
        env::remove_var("TOXIQ_TEST_ENV_API__TIMEOUT");
        env::remove_var("TOXIQ_TEST_ENV_FEED__PAGE_SIZE");

        assert_eq!(cfg.feed.sort, "hot");
        assert_eq!(cfg.api.timeout, Duration::from_secs(3));
        assert_eq!(cfg.feed.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn unknown_feed_values_are_reported() {
        let mut cfg = Config::default();
        cfg.feed.audience = "everyone".into();
        let err = cfg.feed.query().unwrap_err();
        assert!(err.to_string().contains("feed.audience"));
    }
}
