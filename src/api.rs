use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::model::{
    Comment, CommentFilter, DataEnvelope, FeedFilter, FeedPage, LoginResponse, NewComment, Note,
    Post, SupportStatus, WebLogin,
};
use crate::session::Session;

pub const DEFAULT_BASE_URL: &str = "https://api.toxiq.xyz/api/";

pub(crate) const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Transport failures, normalized once at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response arrived (connect, DNS, timeout).
    #[error("network error: {message}")]
    Network { message: String },
    #[error("api error {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: String,
    },
    /// The transport succeeded but the body does not match the contract.
    #[error("malformed response: {message}")]
    Malformed { message: String },
    #[error("{operation} is not supported by the api")]
    Unsupported { operation: &'static str },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    fn network(err: reqwest::Error) -> Self {
        ApiError::Network {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    session: Arc<Session>,
}

impl Client {
    pub fn new(session: Arc<Session>, config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("toxiq client user agent required");
        }
        let mut base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn feed(&self, filter: &FeedFilter) -> Result<FeedPage, ApiError> {
        let envelope: DataEnvelope<FeedPage> =
            self.send_json(Method::POST, "Post/Feed", None, Some(filter))?;
        Ok(envelope.data)
    }

    pub fn post(&self, id: &str) -> Result<Post, ApiError> {
        self.send_json::<_, ()>(Method::GET, "Post/GetPost", Some(id), None)
    }

    pub fn prompt(&self, id: &str) -> Result<Post, ApiError> {
        self.send_json::<_, ()>(Method::GET, "Post/GetPrompt", Some(id), None)
    }

    pub fn note(&self, id: &str) -> Result<Note, ApiError> {
        self.send_json::<_, ()>(Method::GET, "Notes/GetNote", Some(id), None)
    }

    pub fn upvote_post(&self, id: &str) -> Result<(), ApiError> {
        self.send_ack(Method::GET, "Post/Upvote", id)
    }

    pub fn downvote_post(&self, id: &str) -> Result<(), ApiError> {
        self.send_ack(Method::GET, "Post/Downvote", id)
    }

    pub fn remove_post_vote(&self, id: &str) -> Result<(), ApiError> {
        self.send_ack(Method::GET, "Post/Deletevote", id)
    }

    pub fn comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>, ApiError> {
        let envelope: DataEnvelope<Vec<Comment>> =
            self.send_json(Method::POST, "Comment/GetComments", None, Some(filter))?;
        Ok(envelope.data)
    }

    /// Creates a comment. The backend may answer with the stored comment or
    /// with a bare acknowledgement; in the latter case the comment is built
    /// from what was sent.
    pub fn make_comment(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        let ack: Value = self.send_json(Method::POST, "Comment/MakeComment", None, Some(comment))?;
        comment_from_ack(comment, ack)
    }

    pub fn upvote_comment(&self, id: &str) -> Result<(), ApiError> {
        self.send_ack(Method::GET, "Comment/Upvote", id)
    }

    pub fn downvote_comment(&self, id: &str) -> Result<(), ApiError> {
        self.send_ack(Method::GET, "Comment/Downvote", id)
    }

    pub fn web_login(&self, init_data: &str) -> Result<LoginResponse, ApiError> {
        self.send_json(
            Method::POST,
            "Auth/TG_WEB_LOGIN",
            None,
            Some(&WebLogin { otp: init_data }),
        )
    }

    fn endpoint(&self, path: &str, id: Option<&str>) -> Result<Url, ApiError> {
        let relative = match id {
            Some(id) => format!("{}/{}", path, utf8_percent_encode(id, PATH_SEGMENT)),
            None => path.to_string(),
        };
        self.base_url
            .join(&relative)
            .map_err(|err| ApiError::Malformed {
                message: format!("invalid endpoint {relative}: {err}"),
            })
    }

    fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        id: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let resp = self.request(method, path, id, body)?;
        let text = resp.text().map_err(ApiError::network)?;
        serde_json::from_str(&text).map_err(|err| {
            tracing::warn!(path, error = %err, "response does not match contract");
            ApiError::Malformed {
                message: format!("{path}: {err}"),
            }
        })
    }

    fn send_ack(&self, method: Method, path: &str, id: &str) -> Result<(), ApiError> {
        self.request::<()>(method, path, Some(id), None)?;
        Ok(())
    }

    fn request<B>(
        &self,
        method: Method,
        path: &str,
        id: Option<&str>,
        body: Option<&B>,
    ) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path, id)?;
        tracing::debug!(method = %method, url = %url, "api request");

        let mut req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json");
        if let Some(bearer) = self.session.bearer() {
            req = req.header(AUTHORIZATION, bearer);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().map_err(ApiError::network)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().unwrap_or_default();
        let message = error_message(status, &body);
        tracing::debug!(status = status.as_u16(), %message, "api error response");
        if status == StatusCode::UNAUTHORIZED {
            if let Err(err) = self.session.clear() {
                tracing::warn!(error = %err, "failed to clear rejected session");
            }
        }
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
            body,
        })
    }
}

fn comment_from_ack(sent: &NewComment, ack: Value) -> Result<Comment, ApiError> {
    if ack.get("Id").is_some() {
        return serde_json::from_value(ack).map_err(|err| ApiError::Malformed {
            message: format!("Comment/MakeComment: {err}"),
        });
    }
    let acknowledged = match &ack {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    };
    if !acknowledged {
        return Err(ApiError::Malformed {
            message: format!("Comment/MakeComment: not acknowledged ({ack})"),
        });
    }
    tracing::debug!("comment acknowledged without a body, using local copy");
    Ok(Comment {
        id: String::new(),
        user_name: String::new(),
        name: String::new(),
        content: sent.content.clone(),
        support_status: SupportStatus::Neutral,
        support_count: 0,
        reply_count: 0,
        replies: Vec::new(),
        date_created: Some(Utc::now().to_rfc3339()),
    })
}

/// Best-effort human message for an error body.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "Message", "title", "error"] {
            if let Some(Value::String(msg)) = map.get(key) {
                if !msg.trim().is_empty() {
                    return msg.trim().to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with(['{', '[', '<']) && trimmed.len() <= 300 {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
