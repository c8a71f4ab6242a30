//! Telegram Mini App launch parameters and the entry-route decision.
//!
//! Telegram opens the app with its launch parameters packed into the URL
//! fragment (`#tgWebAppData=...&tgWebAppStartParam=...`). Some clients put
//! them in the query string instead, so both are read.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use url::form_urlencoded;

use crate::resolver::{self, IdSource, Location, PostId, RouteParams};

const INIT_DATA_KEY: &str = "tgWebAppData";
const PLATFORM_KEY: &str = "tgWebAppPlatform";
const VERSION_KEY: &str = "tgWebAppVersion";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("init data is empty")]
    Empty,
    #[error("init data user is not valid JSON: {0}")]
    User(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// Raw, still-signed init data exactly as Telegram passed it.
    pub init_data: Option<String>,
    pub start_param: Option<String>,
    pub platform: Option<String>,
    pub version: Option<String>,
}

impl LaunchParams {
    pub fn from_hash(hash: &str) -> Self {
        let mut params = Self::default();
        params.fill_from(hash);
        params
    }

    pub fn from_location(location: &Location) -> Self {
        let mut params = Self::from_hash(&location.hash);
        params.fill_from(&location.search);
        params
    }

    fn fill_from(&mut self, raw: &str) {
        let raw = raw.trim_start_matches(['#', '?']);
        if raw.is_empty() {
            return;
        }
        let pairs: HashMap<String, String> = form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        let take = |slot: &mut Option<String>, key: &str| {
            if slot.is_none() {
                *slot = pairs.get(key).cloned();
            }
        };
        take(&mut self.init_data, INIT_DATA_KEY);
        take(&mut self.start_param, resolver::START_PARAM_KEY);
        take(&mut self.platform, PLATFORM_KEY);
        take(&mut self.version, VERSION_KEY);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitDataUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

/// Decoded view of the init data. The signature is not checked here; the
/// backend verifies it during login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub user: Option<InitDataUser>,
    pub auth_date: Option<DateTime<Utc>>,
    pub query_id: Option<String>,
    pub start_param: Option<String>,
    pub hash: Option<String>,
}

impl InitData {
    pub fn parse(raw: &str) -> Result<Self, LaunchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LaunchError::Empty);
        }
        let params: HashMap<String, String> =
            form_urlencoded::parse(raw.as_bytes()).into_owned().collect();

        let user = params
            .get("user")
            .map(|json| serde_json::from_str::<InitDataUser>(json))
            .transpose()?;
        let auth_date = params
            .get("auth_date")
            .and_then(|secs| secs.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Ok(Self {
            user,
            auth_date,
            query_id: params.get("query_id").cloned(),
            start_param: params.get("start_param").cloned(),
            hash: params.get("hash").cloned(),
        })
    }

    pub fn display_name(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        match &user.username {
            Some(username) if !username.is_empty() => Some(format!("@{username}")),
            _ => Some(user.first_name.clone()),
        }
    }
}

/// Where the app should land after start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Post { id: PostId, source: IdSource },
}

/// Entry decision: a resolved post identifier renders the post directly,
/// anything else goes to the home feed.
pub fn route(location: &Location, route_params: &RouteParams, launch: &LaunchParams) -> Route {
    match resolver::resolve(location, route_params, launch) {
        Some(resolved) => {
            tracing::debug!(id = %resolved.id, source = %resolved.source, "resolved post from launch");
            Route::Post {
                id: resolved.id,
                source: resolved.source,
            }
        }
        None => Route::Home,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &str = "query_id=AAH&user=%7B%22id%22%3A123456789%2C%22first_name%22%3A%22Test%22%2C%22username%22%3A%22tester%22%7D&auth_date=1700000000&hash=abc";

    #[test]
    fn launch_params_from_hash() {
        let encoded: String = form_urlencoded::byte_serialize(INIT.as_bytes()).collect();
        let hash = format!(
            "#tgWebAppData={encoded}&tgWebAppVersion=7.0&tgWebAppPlatform=ios&tgWebAppStartParam=post-abc-1"
        );
        let params = LaunchParams::from_hash(&hash);
        assert_eq!(params.init_data.as_deref(), Some(INIT));
        assert_eq!(params.start_param.as_deref(), Some("post-abc-1"));
        assert_eq!(params.platform.as_deref(), Some("ios"));
        assert_eq!(params.version.as_deref(), Some("7.0"));
    }

    #[test]
    fn hash_wins_over_search() {
        let location = Location {
            search: "?tgWebAppStartParam=from-search&tgWebAppPlatform=android".into(),
            hash: "#tgWebAppStartParam=from-hash".into(),
            ..Location::default()
        };
        let params = LaunchParams::from_location(&location);
        assert_eq!(params.start_param.as_deref(), Some("from-hash"));
        assert_eq!(params.platform.as_deref(), Some("android"));
        assert_eq!(params.init_data, None);
    }

    #[test]
    fn init_data_decodes_user() {
        let data = InitData::parse(INIT).unwrap();
        let user = data.user.as_ref().unwrap();
        assert_eq!(user.id, 123456789);
        assert_eq!(data.display_name().as_deref(), Some("@tester"));
        assert_eq!(data.auth_date.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(data.hash.as_deref(), Some("abc"));
    }

    #[test]
    fn init_data_errors() {
        assert!(matches!(InitData::parse("  "), Err(LaunchError::Empty)));
        assert!(matches!(
            InitData::parse("user=%7Bnot-json"),
            Err(LaunchError::User(_))
        ));
    }

    #[test]
    fn route_falls_back_to_home() {
        let location = Location::parse("https://app.example/").unwrap();
        assert_eq!(
            route(&location, &RouteParams::default(), &LaunchParams::default()),
            Route::Home
        );

        let location = Location::parse("https://app.example/?startapp=shared-post-1").unwrap();
        match route(&location, &RouteParams::default(), &LaunchParams::default()) {
            Route::Post { id, source } => {
                assert_eq!(id.as_str(), "shared-post-1");
                assert_eq!(source, IdSource::StartApp);
            }
            other => panic!("unexpected route {other:?}"),
        }
    }
}
