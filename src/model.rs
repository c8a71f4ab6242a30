use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feed visibility filter. Travels as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Audience {
    Friends,
    Following,
    #[default]
    All,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Friends => "friends",
            Audience::Following => "following",
            Audience::All => "all",
        }
    }
}

impl From<Audience> for u8 {
    fn from(value: Audience) -> Self {
        match value {
            Audience::Friends => 0,
            Audience::Following => 1,
            Audience::All => 2,
        }
    }
}

impl TryFrom<u8> for Audience {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Audience::Friends),
            1 => Ok(Audience::Following),
            2 => Ok(Audience::All),
            other => Err(format!("unknown audience {other}")),
        }
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "friends" => Ok(Audience::Friends),
            "following" => Ok(Audience::Following),
            "all" => Ok(Audience::All),
            other => Err(format!("unknown audience {other:?} (friends, following, all)")),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feed and comment ordering. Travels as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SortType {
    #[default]
    New,
    Controversial,
    Hot,
    Top,
}

impl SortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::New => "new",
            SortType::Controversial => "controversial",
            SortType::Hot => "hot",
            SortType::Top => "top",
        }
    }
}

impl From<SortType> for u8 {
    fn from(value: SortType) -> Self {
        match value {
            SortType::New => 0,
            SortType::Controversial => 1,
            SortType::Hot => 2,
            SortType::Top => 3,
        }
    }
}

impl TryFrom<u8> for SortType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SortType::New),
            1 => Ok(SortType::Controversial),
            2 => Ok(SortType::Hot),
            3 => Ok(SortType::Top),
            other => Err(format!("unknown sort {other}")),
        }
    }
}

impl FromStr for SortType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(SortType::New),
            "controversial" => Ok(SortType::Controversial),
            "hot" => Ok(SortType::Hot),
            "top" => Ok(SortType::Top),
            other => Err(format!(
                "unknown sort {other:?} (new, controversial, hot, top)"
            )),
        }
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum PostType {
    #[default]
    Text,
    Image,
    Wall,
    Other(i64),
}

impl From<i64> for PostType {
    fn from(value: i64) -> Self {
        match value {
            0 => PostType::Text,
            1 => PostType::Image,
            2 => PostType::Wall,
            other => PostType::Other(other),
        }
    }
}

impl From<PostType> for i64 {
    fn from(value: PostType) -> Self {
        match value {
            PostType::Text => 0,
            PostType::Image => 1,
            PostType::Wall => 2,
            PostType::Other(other) => other,
        }
    }
}

/// What a post replies to; selects the endpoint used to load the quoted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ReplyType {
    #[default]
    Non,
    Text,
    Note,
    Comment,
    Prompt,
    Other(i64),
}

impl From<i64> for ReplyType {
    fn from(value: i64) -> Self {
        match value {
            0 => ReplyType::Non,
            1 => ReplyType::Text,
            2 => ReplyType::Note,
            3 => ReplyType::Comment,
            4 => ReplyType::Prompt,
            other => ReplyType::Other(other),
        }
    }
}

impl From<ReplyType> for i64 {
    fn from(value: ReplyType) -> Self {
        match value {
            ReplyType::Non => 0,
            ReplyType::Text => 1,
            ReplyType::Note => 2,
            ReplyType::Comment => 3,
            ReplyType::Prompt => 4,
            ReplyType::Other(other) => other,
        }
    }
}

/// Tri-state like marker. On the wire: `true`, `false` or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum SupportStatus {
    Liked,
    Disliked,
    #[default]
    Neutral,
}

impl SupportStatus {
    /// Contribution of this status to the support count.
    pub fn weight(&self) -> i64 {
        match self {
            SupportStatus::Liked => 1,
            SupportStatus::Disliked => -1,
            SupportStatus::Neutral => 0,
        }
    }
}

impl From<Option<bool>> for SupportStatus {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => SupportStatus::Liked,
            Some(false) => SupportStatus::Disliked,
            None => SupportStatus::Neutral,
        }
    }
}

impl From<SupportStatus> for Option<bool> {
    fn from(value: SupportStatus) -> Self {
        match value {
            SupportStatus::Liked => Some(true),
            SupportStatus::Disliked => Some(false),
            SupportStatus::Neutral => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PostMedia {
    #[serde(default)]
    pub media_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "Type")]
    pub kind: PostType,
    #[serde(default)]
    pub post_color: Option<String>,
    #[serde(default)]
    pub post_media: Vec<PostMedia>,
    #[serde(default)]
    pub support_status: SupportStatus,
    #[serde(default)]
    pub support_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub reply_type: ReplyType,
    #[serde(default)]
    pub reply_ref_id: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

impl Post {
    pub fn media_path(&self) -> Option<&str> {
        self.post_media
            .first()
            .map(|media| media.media_path.as_str())
            .filter(|path| !path.is_empty())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.date_created.as_deref().and_then(parse_timestamp)
    }

    /// Reply linkage, present only when the post quotes something.
    pub fn reply_ref(&self) -> Option<(ReplyType, &str)> {
        match (self.reply_type, self.reply_ref_id.as_deref()) {
            (ReplyType::Non, _) | (_, None) | (_, Some("")) => None,
            (kind, Some(id)) => Some((kind, id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub support_status: SupportStatus,
    #[serde(default)]
    pub support_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub date_created: Option<String>,
}

impl Comment {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.date_created.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Note {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Profile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub name: String,
}

/// One page of the feed. Both fields are required; a response lacking
/// either is malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedFilter {
    pub page: u32,
    pub count: u32,
    pub audience: Audience,
    pub sort: SortType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommentFilter {
    pub id: String,
    pub page: u32,
    pub count: u32,
    pub is_reply: bool,
    pub sort: SortType,
}

impl CommentFilter {
    pub fn comments(post_id: &str, count: u32) -> Self {
        Self {
            id: post_id.to_string(),
            page: 1,
            count,
            is_reply: false,
            sort: SortType::New,
        }
    }

    pub fn replies(comment_id: &str, count: u32) -> Self {
        Self {
            is_reply: true,
            ..Self::comments(comment_id, count)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewComment {
    pub content: String,
    pub post_id: String,
    pub is_reply: bool,
    pub replied_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WebLogin<'a> {
    #[serde(rename = "OTP")]
    pub otp: &'a str,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
