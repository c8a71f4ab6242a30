use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;

use crate::api::ApiError;
use crate::data::AuthService;
use crate::model::Profile;
use crate::storage::Store;

pub const TOKEN_KEY: &str = "token";
pub const PROFILE_KEY: &str = "userProfile";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("telegram init data missing; reopen the app from inside Telegram")]
    InitDataMissing,
    #[error("login rejected: {0}")]
    Rejected(#[source] ApiError),
    #[error("login response carried no token")]
    NoToken,
    #[error("persist session: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Bearer token holder passed explicitly to the API client. When backed by
/// a [`Store`] every change is persisted under [`TOKEN_KEY`].
#[derive(Debug, Default)]
pub struct Session {
    store: Option<Arc<Store>>,
    token: RwLock<Option<String>>,
    profile: RwLock<Option<Profile>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            ..Self::default()
        }
    }

    pub fn restore(store: Arc<Store>) -> Result<Self> {
        let token = store
            .get(TOKEN_KEY)?
            .filter(|token| !token.trim().is_empty());
        let profile = match store.get(PROFILE_KEY)? {
            Some(raw) => match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unreadable stored profile");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            store: Some(store),
            token: RwLock::new(token),
            profile: RwLock::new(profile),
        })
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    pub fn profile(&self) -> Option<Profile> {
        self.profile.read().clone()
    }

    /// Records a successful login. The token and profile are persisted in
    /// one write, so the store never holds a token without its profile.
    pub fn set_login(&self, token: &str, profile: Option<Profile>) -> Result<()> {
        if let Some(store) = &self.store {
            let encoded = profile
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("session: encode profile")?;
            store.apply(&[(TOKEN_KEY, Some(token)), (PROFILE_KEY, encoded.as_deref())])?;
        }
        *self.token.write() = Some(token.to_string());
        *self.profile.write() = profile;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        *self.token.write() = None;
        *self.profile.write() = None;
        if let Some(store) = &self.store {
            store.apply(&[(TOKEN_KEY, None), (PROFILE_KEY, None)])?;
        }
        Ok(())
    }
}

/// Exchanges Telegram init data for a backend session token.
pub fn login(
    auth: &dyn AuthService,
    session: &Session,
    init_data: Option<&str>,
) -> Result<Option<Profile>, AuthError> {
    let init_data = init_data
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(AuthError::InitDataMissing)?;

    let response = auth.web_login(init_data).map_err(|err| {
        tracing::warn!(error = %err, "telegram login failed");
        AuthError::Rejected(err)
    })?;

    let token = response
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or(AuthError::NoToken)?;
    session.set_login(&token, response.profile.clone())?;
    tracing::info!(
        user = response.profile.as_ref().map(|p| p.user_name.as_str()).unwrap_or(""),
        "logged in"
    );
    Ok(response.profile)
}

/// Logs in only when no token is stored yet. Returns whether a login call
/// was made.
pub fn ensure_login(
    auth: &dyn AuthService,
    session: &Session,
    init_data: Option<&str>,
) -> Result<bool, AuthError> {
    if session.is_authenticated() {
        return Ok(false);
    }
    login(auth, session, init_data)?;
    Ok(true)
}
