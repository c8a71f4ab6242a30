use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use url::{form_urlencoded, Url};

use crate::launch::LaunchParams;

/// Query parameter Telegram uses to forward a deep-link payload.
pub const START_PARAM_KEY: &str = "tgWebAppStartParam";

/// Candidates of this many characters or fewer are treated as truncated.
pub const MIN_LEN_EXCLUSIVE: usize = 5;

static START_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tgWebAppStartParam=([^&#]+)").expect("valid start param pattern"));
static STARTAPP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"startapp=([^&#]+)").expect("valid startapp pattern"));

/// Opaque post identifier. Only a coarse length check is applied; the
/// backend is the authority on whether it names a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostId(String);

impl PostId {
    /// Accepts the candidate verbatim when it is longer than
    /// [`MIN_LEN_EXCLUSIVE`] characters. No normalization is applied.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.chars().count() > MIN_LEN_EXCLUSIVE {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PostId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The current navigation location, split the way a browser exposes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub href: String,
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(raw.trim())?;
        Ok(Self {
            href: url.as_str().to_string(),
            pathname: url.path().to_string(),
            search: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            hash: url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    pub post_id: Option<String>,
}

impl RouteParams {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            post_id: Some(id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSource {
    RouteParam,
    TgWebAppUrl,
    TgWebAppQuery,
    TgWebAppHash,
    StartApp,
    LaunchParam,
}

impl IdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdSource::RouteParam => "route-param",
            IdSource::TgWebAppUrl => "tg-web-app-param",
            IdSource::TgWebAppQuery => "tg-web-app-param-query",
            IdSource::TgWebAppHash => "tg-web-app-param-hash",
            IdSource::StartApp => "startapp",
            IdSource::LaunchParam => "launch-param",
        }
    }

    pub fn is_tg_web_app_param(&self) -> bool {
        matches!(
            self,
            IdSource::TgWebAppUrl | IdSource::TgWebAppQuery | IdSource::TgWebAppHash
        )
    }
}

impl fmt::Display for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub source: IdSource,
    pub id: PostId,
}

pub struct Inputs<'a> {
    pub location: &'a Location,
    pub route: &'a RouteParams,
    pub launch: &'a LaunchParams,
}

type Candidate = fn(&Inputs<'_>) -> Option<String>;

/// Scan order. The first candidate that passes [`PostId::parse`] wins.
const SOURCES: &[(IdSource, Candidate)] = &[
    (IdSource::RouteParam, from_route),
    (IdSource::TgWebAppUrl, from_href),
    (IdSource::TgWebAppQuery, from_search),
    (IdSource::TgWebAppHash, from_hash_query),
    (IdSource::StartApp, startapp_in_path),
    (IdSource::StartApp, startapp_in_href),
    (IdSource::LaunchParam, from_launch),
];

pub fn resolve(
    location: &Location,
    route: &RouteParams,
    launch: &LaunchParams,
) -> Option<Resolved> {
    let inputs = Inputs {
        location,
        route,
        launch,
    };
    SOURCES.iter().find_map(|(source, candidate)| {
        let raw = candidate(&inputs)?;
        match PostId::parse(&raw) {
            Some(id) => Some(Resolved {
                source: *source,
                id,
            }),
            None => {
                tracing::debug!(source = %source, candidate = %raw, "post id candidate too short");
                None
            }
        }
    })
}

fn from_route(inputs: &Inputs<'_>) -> Option<String> {
    inputs.route.post_id.clone()
}

fn from_href(inputs: &Inputs<'_>) -> Option<String> {
    capture(&START_PARAM_RE, &inputs.location.href)
}

fn from_search(inputs: &Inputs<'_>) -> Option<String> {
    query_value(&inputs.location.search, START_PARAM_KEY)
}

fn from_hash_query(inputs: &Inputs<'_>) -> Option<String> {
    let (_, query) = inputs.location.hash.split_once('?')?;
    query_value(query, START_PARAM_KEY)
}

fn startapp_in_path(inputs: &Inputs<'_>) -> Option<String> {
    capture(&STARTAPP_RE, &inputs.location.pathname)
}

fn startapp_in_href(inputs: &Inputs<'_>) -> Option<String> {
    capture(&STARTAPP_RE, &inputs.location.href)
}

fn from_launch(inputs: &Inputs<'_>) -> Option<String> {
    inputs.launch.start_param.clone()
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub(crate) fn query_value(query: &str, key: &str) -> Option<String> {
    let query = query.trim_start_matches(['?', '#']);
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(raw: &str) -> Location {
        Location::parse(raw).unwrap()
    }

    #[test]
    fn route_param_wins_over_everything() {
        let loc = location("https://app.example/posts/?tgWebAppStartParam=other-id-1&startapp=third-id");
        let launch = LaunchParams {
            start_param: Some("launch-id-9".into()),
            ..LaunchParams::default()
        };
        let resolved = resolve(&loc, &RouteParams::post("route-id-42"), &launch).unwrap();
        assert_eq!(resolved.source, IdSource::RouteParam);
        assert_eq!(resolved.id.as_str(), "route-id-42");
    }

    #[test]
    fn start_param_in_url() {
        let loc = location("https://app.example/posts/?tgWebAppStartParam=XYZ123");
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.id.as_str(), "XYZ123");
        assert!(resolved.source.is_tg_web_app_param());
        assert_eq!(resolved.source, IdSource::TgWebAppUrl);
    }

    #[test]
    fn start_param_stops_at_hash_and_ampersand() {
        let loc = location("https://app.example/?tgWebAppStartParam=abcdef123&x=1#frag");
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.id.as_str(), "abcdef123");

        let loc = location("https://app.example/#tgWebAppData=x&tgWebAppStartParam=hash-id-77");
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.id.as_str(), "hash-id-77");
    }

    #[test]
    fn search_component_without_href() {
        let loc = Location {
            search: "?tgWebAppStartParam=query-id-1".into(),
            ..Location::default()
        };
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.source, IdSource::TgWebAppQuery);
    }

    #[test]
    fn query_embedded_in_hash() {
        let loc = Location {
            hash: "#/posts?tgWebAppStartParam=hashq-id-2".into(),
            ..Location::default()
        };
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.source, IdSource::TgWebAppHash);
        assert_eq!(resolved.id.as_str(), "hashq-id-2");
    }

    #[test]
    fn startapp_checked_in_path_then_href() {
        let loc = Location {
            pathname: "/?startapp=path-id-33".into(),
            href: "https://app.example/?startapp=href-id-44".into(),
            ..Location::default()
        };
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.source, IdSource::StartApp);
        assert_eq!(resolved.id.as_str(), "path-id-33");

        let loc = location("https://t.me/app?startapp=href-id-44");
        let resolved = resolve(&loc, &RouteParams::default(), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.id.as_str(), "href-id-44");
    }

    #[test]
    fn launch_param_is_last_resort() {
        let launch = LaunchParams {
            start_param: Some("launch-id-5".into()),
            ..LaunchParams::default()
        };
        let resolved = resolve(
            &location("https://app.example/"),
            &RouteParams::default(),
            &launch,
        )
        .unwrap();
        assert_eq!(resolved.source, IdSource::LaunchParam);
    }

    #[test]
    fn short_candidates_everywhere_resolve_to_none() {
        let loc = Location {
            href: "https://app.example/?tgWebAppStartParam=abc&startapp=abcde".into(),
            pathname: "/?startapp=ab".into(),
            search: "?tgWebAppStartParam=abc".into(),
            hash: "#/x?tgWebAppStartParam=a".into(),
        };
        let launch = LaunchParams {
            start_param: Some("12345".into()),
            ..LaunchParams::default()
        };
        assert_eq!(resolve(&loc, &RouteParams::post("abcde"), &launch), None);
    }

    #[test]
    fn short_route_param_falls_through() {
        let loc = location("https://app.example/?tgWebAppStartParam=long-enough");
        let resolved = resolve(&loc, &RouteParams::post("abc"), &LaunchParams::default()).unwrap();
        assert_eq!(resolved.source, IdSource::TgWebAppUrl);
    }

    #[test]
    fn post_id_counts_characters() {
        assert!(PostId::parse("ééééé").is_none());
        assert!(PostId::parse("éééééé").is_some());
        assert!(PostId::parse("   ").is_none());
    }

    #[test]
    fn candidates_are_taken_verbatim() {
        let resolved = resolve(
            &location("https://app.example/?tgWebAppStartParam=from-url-1"),
            &RouteParams::post("abcde "),
            &LaunchParams::default(),
        )
        .unwrap();
        assert_eq!(resolved.source, IdSource::RouteParam);
        assert_eq!(resolved.id.as_str(), "abcde ");

        assert_eq!(PostId::parse(" abcdef").unwrap().as_str(), " abcdef");
    }
}
