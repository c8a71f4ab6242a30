use std::borrow::Cow;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[@([^\]]+)\]\(user:([^)]+)\)").expect("valid mention regex"));
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Mention { username: String, guid: String },
}

/// Splits post text on `[@name](user:guid)` mentions.
pub fn segments(text: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in MENTION_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            out.push(Segment::Text(text[last..whole.start()].to_string()));
        }
        out.push(Segment::Mention {
            username: caps[1].to_string(),
            guid: caps[2].to_string(),
        });
        last = whole.end();
    }
    if last < text.len() {
        out.push(Segment::Text(text[last..].to_string()));
    }
    out
}

pub fn plain(text: &str) -> String {
    segments(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(text) => text,
            Segment::Mention { username, .. } => format!("@{username}"),
        })
        .collect()
}

/// Comment bodies write mentions as `#name`.
pub fn hashtag_mentions(text: &str) -> Cow<'_, str> {
    HASHTAG_RE.replace_all(text, "@$1")
}

pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let round = |value: f64, by: f64| (value / by).round();
    let secs = round((now - then).num_milliseconds() as f64, 1000.0);
    let mins = round(secs, 60.0);
    let hours = round(mins, 60.0);
    let days = round(hours, 24.0);

    if secs < 60.0 {
        "just now".to_string()
    } else if mins < 60.0 {
        format!("{mins}m ago")
    } else if hours < 24.0 {
        format!("{hours}h ago")
    } else if days < 30.0 {
        format!("{days}d ago")
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn splits_mentions() {
        let parts = segments("hey [@alice](user:1234-abcd), see [@bob](user:99)!");
        assert_eq!(
            parts,
            vec![
                Segment::Text("hey ".into()),
                Segment::Mention {
                    username: "alice".into(),
                    guid: "1234-abcd".into()
                },
                Segment::Text(", see ".into()),
                Segment::Mention {
                    username: "bob".into(),
                    guid: "99".into()
                },
                Segment::Text("!".into()),
            ]
        );
        assert_eq!(plain("hey [@alice](user:1) hi"), "hey @alice hi");
    }

    #[test]
    fn text_without_mentions() {
        assert_eq!(segments("plain [@broken](usr:1)"), vec![Segment::Text("plain [@broken](usr:1)".into())]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn hashtags_become_mentions() {
        assert_eq!(hashtag_mentions("thanks #carol and #dave_2!"), "thanks @carol and @dave_2!");
        assert_eq!(hashtag_mentions("# alone"), "# alone");
    }

    #[test]
    fn relative_times() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(20), now), "just now");
        assert_eq!(relative_time(now + Duration::minutes(5), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::minutes(90), now), "2h ago");
        assert_eq!(relative_time(now - Duration::hours(30), now), "1d ago");
        assert_eq!(relative_time(now - Duration::days(29), now), "29d ago");
        assert_eq!(relative_time(now - Duration::days(45), now), "2024-04-05");
    }
}
