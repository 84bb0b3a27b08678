//! Credentials, token pairs and the [`TokenStore`] that keeps a session's tokens valid.
//!
//! A session starts empty. The first authenticated call performs a password grant; from then on
//! an expired access token is renewed with the refresh token, falling back to a fresh password
//! grant whenever the refresh does not succeed. Every change to the session replaces the whole
//! [`TokenPair`], and only once the exchange that produced it has fully completed.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{ACCEPT, HeaderValue};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::error::{Error, Exchange, Kind};
use crate::types::ApiResponse;
use crate::{Result, endpoint, send};

pub(crate) const PASSWORD_PATH: &str = "/token/password";
pub(crate) const REFRESH_PATH: &str = "/token/refresh";
pub(crate) const LOGOUT_PATH: &str = "/logout";

/// Identity used for password grants. Immutable once the client is constructed.
#[derive(Clone, Debug)]
pub struct Credentials {
    client_id: String,
    username: String,
    password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(client_id: &str, username: &str, password: String) -> Self {
        Self {
            client_id: client_id.trim().to_owned(),
            username: username.trim().to_owned(),
            password: SecretString::from(password),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

/// Access and refresh tokens issued together by one exchange.
///
/// Lifetimes are counted in seconds from `acquired`, the instant taken just before the exchange
/// that issued the pair was sent. A pair that was never stamped counts as expired.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    access_token: SecretString,
    expires_in: u64,
    refresh_token: SecretString,
    refresh_expires_in: u64,
    #[serde(skip)]
    acquired: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Rebuilds a pair obtained elsewhere, e.g. from [`crate::Client::tokens`] in another process.
    #[must_use]
    pub fn new(
        access_token: String,
        expires_in: u64,
        refresh_token: String,
        refresh_expires_in: u64,
        acquired: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token),
            expires_in,
            refresh_token: SecretString::from(refresh_token),
            refresh_expires_in,
            acquired,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    /// Access token lifetime in seconds.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    #[must_use]
    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    /// Refresh token lifetime in seconds.
    #[must_use]
    pub fn refresh_expires_in(&self) -> u64 {
        self.refresh_expires_in
    }

    #[must_use]
    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        self.acquired
    }

    #[must_use]
    pub fn is_access_expired(&self) -> bool {
        self.is_access_expired_at(Utc::now())
    }

    /// Whether the access token is unusable at `now`. Reaching the lifetime exactly counts as
    /// expired.
    #[must_use]
    pub fn is_access_expired_at(&self, now: DateTime<Utc>) -> bool {
        expired_at(&self.access_token, self.expires_in, self.acquired, now)
    }

    #[must_use]
    pub fn is_refresh_expired(&self) -> bool {
        self.is_refresh_expired_at(Utc::now())
    }

    /// Same rule as [`TokenPair::is_access_expired_at`], against the refresh token.
    #[must_use]
    pub fn is_refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        expired_at(
            &self.refresh_token,
            self.refresh_expires_in,
            self.acquired,
            now,
        )
    }

    pub(crate) fn stamped(mut self, acquired: DateTime<Utc>) -> Self {
        self.acquired = Some(acquired);
        self
    }
}

fn expired_at(
    token: &SecretString,
    lifetime: u64,
    acquired: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(acquired) = acquired else {
        return true;
    };
    if token.expose_secret().is_empty() {
        return true;
    }

    // Lifetimes beyond what `TimeDelta` can hold never elapse
    let lifetime = i64::try_from(lifetime).ok().and_then(TimeDelta::try_seconds);
    lifetime.is_some_and(|lifetime| now.signed_duration_since(acquired) >= lifetime)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordGrant<'req> {
    client_id: &'req str,
    username: &'req str,
    password: &'req str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshGrant<'req> {
    client_id: &'req str,
    refresh_token: &'req str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'req> {
    client_id: &'req str,
    refresh_token: &'req str,
    access_token: &'req str,
}

/// Owns a session's credentials and its current [`TokenPair`].
///
/// All reads and writes of the pair go through one async mutex that stays locked for the whole
/// of a validation or exchange, so concurrent callers never see a half-updated session and
/// never race each other into duplicate password grants. Dropping an in-flight call leaves the
/// previous pair untouched.
#[derive(Debug)]
pub struct TokenStore {
    credentials: Credentials,
    auth_url: Url,
    http: reqwest::Client,
    tokens: Mutex<Option<TokenPair>>,
}

impl TokenStore {
    /// Creates an empty session. Nothing is sent until a token is first needed.
    #[must_use]
    pub fn new(credentials: Credentials, auth_url: Url, http: reqwest::Client) -> Self {
        Self {
            credentials,
            auth_url,
            http,
            tokens: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Performs a password grant and replaces the current pair with the one it returns.
    pub async fn acquire(&self) -> Result<TokenPair> {
        let mut tokens = self.tokens.lock().await;

        let pair = self.password_grant().await?;
        *tokens = Some(pair.clone());

        Ok(pair)
    }

    /// Replaces an access token the server rejected and returns its successor.
    ///
    /// When another caller already replaced `rejected` while this one waited for the session, the
    /// current token is returned without a new password grant.
    pub async fn reacquire(&self, rejected: &SecretString) -> Result<SecretString> {
        let mut tokens = self.tokens.lock().await;

        if let Some(pair) = tokens.as_ref().filter(|pair| {
            !pair.is_access_expired()
                && pair.access_token.expose_secret() != rejected.expose_secret()
        }) {
            return Ok(pair.access_token.clone());
        }

        let pair = self.password_grant().await?;
        let access_token = pair.access_token.clone();
        *tokens = Some(pair);

        Ok(access_token)
    }

    /// Exchanges the refresh token for a new pair.
    ///
    /// Fails with [`Kind::SessionExpired`] without sending anything when the refresh token is
    /// itself expired or missing.
    pub async fn refresh(&self) -> Result<TokenPair> {
        let mut tokens = self.tokens.lock().await;

        let pair = self.refresh_grant(tokens.as_ref()).await?;
        *tokens = Some(pair.clone());

        Ok(pair)
    }

    /// Makes sure the session holds an unexpired access token and returns it.
    ///
    /// An expired access token is refreshed; when the refresh fails for any reason a password
    /// grant is attempted instead. If that fails too, the error is [`Kind::SessionExpired`] when
    /// the session held a pair whose refresh token had already expired, and
    /// [`Kind::Authentication`] otherwise, including for a session that never held a pair.
    pub async fn ensure_valid(&self) -> Result<SecretString> {
        let mut tokens = self.tokens.lock().await;

        if let Some(pair) = tokens.as_ref().filter(|pair| !pair.is_access_expired()) {
            return Ok(pair.access_token.clone());
        }

        let pair = match self.refresh_grant(tokens.as_ref()).await {
            Ok(pair) => pair,
            Err(refresh_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    error = %refresh_err,
                    "token refresh unavailable, falling back to password grant"
                );

                match self.password_grant().await {
                    Ok(pair) => pair,
                    Err(e)
                        if tokens.is_some() && refresh_err.kind() == Kind::SessionExpired =>
                    {
                        return Err(Error::session_expired(Some(e)));
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let access_token = pair.access_token.clone();
        *tokens = Some(pair);

        Ok(access_token)
    }

    /// Revokes the session and clears the local pair.
    ///
    /// Nothing is sent when the access token is already expired, since the server no longer
    /// honours it; the local pair is kept in that case so a refresh can still be attempted.
    pub async fn logout(&self) -> Result<()> {
        let mut tokens = self.tokens.lock().await;

        let Some(pair) = tokens.as_ref().filter(|pair| !pair.is_access_expired()) else {
            #[cfg(feature = "tracing")]
            tracing::debug!("access token already expired, skipping logout");
            return Ok(());
        };

        let body = LogoutRequest {
            client_id: &self.credentials.client_id,
            refresh_token: pair.refresh_token.expose_secret(),
            access_token: pair.access_token.expose_secret(),
        };
        self.post(LOGOUT_PATH, &body).await?;

        *tokens = None;

        #[cfg(feature = "tracing")]
        tracing::debug!(client_id = %self.credentials.client_id, "logged out");

        Ok(())
    }

    /// A copy of the current pair, if any.
    pub async fn snapshot(&self) -> Option<TokenPair> {
        self.tokens.lock().await.clone()
    }

    /// Replaces the current pair wholesale.
    pub async fn restore(&self, pair: TokenPair) {
        *self.tokens.lock().await = Some(pair);
    }

    async fn password_grant(&self) -> Result<TokenPair> {
        let acquired = Utc::now();
        let body = PasswordGrant {
            client_id: &self.credentials.client_id,
            username: &self.credentials.username,
            password: self.credentials.password.expose_secret(),
        };

        let pair = self
            .exchange(PASSWORD_PATH, &body)
            .await
            .map_err(|e| Error::authentication(Exchange::Password, e))?
            .stamped(acquired);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            client_id = %self.credentials.client_id,
            expires_in = pair.expires_in,
            "acquired token pair"
        );

        Ok(pair)
    }

    async fn refresh_grant(&self, current: Option<&TokenPair>) -> Result<TokenPair> {
        let Some(current) = current.filter(|pair| !pair.is_refresh_expired()) else {
            return Err(Error::session_expired(None));
        };

        let acquired = Utc::now();
        let body = RefreshGrant {
            client_id: &self.credentials.client_id,
            refresh_token: current.refresh_token.expose_secret(),
        };

        let pair = self
            .exchange(REFRESH_PATH, &body)
            .await
            .map_err(|e| Error::authentication(Exchange::Refresh, e))?
            .stamped(acquired);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            client_id = %self.credentials.client_id,
            expires_in = pair.expires_in,
            "refreshed token pair"
        );

        Ok(pair)
    }

    async fn exchange<B: Serialize>(&self, path: &str, body: &B) -> Result<TokenPair> {
        self.post(path, body).await?.json()
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let request = self
            .http
            .post(endpoint(&self.auth_url, path)?)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(body)
            .build()?;

        send(&self.http, request).await
    }
}
