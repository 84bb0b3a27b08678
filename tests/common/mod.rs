#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use chrono::{DateTime, TimeDelta, Utc};
use httpmock::{Method::POST, Mock, MockServer};
use reqwest::StatusCode;
use samplify_client_sdk::auth::{Credentials, TokenPair};
use samplify_client_sdk::client::Endpoints;
use samplify_client_sdk::{Client, Config};
use serde_json::{Value, json};

pub const CLIENT_ID: &str = "api";
pub const USERNAME: &str = "samplify-user";
pub const PASSWORD: &str = "s3cret";

pub const PASSWORD_PATH: &str = "/auth/v1/token/password";
pub const REFRESH_PATH: &str = "/auth/v1/token/refresh";
pub const LOGOUT_PATH: &str = "/auth/v1/logout";

pub const ACCESS_LIFETIME: u64 = 1800;
pub const REFRESH_LIFETIME: u64 = 3600;

pub fn create_client(server: &MockServer) -> anyhow::Result<Client> {
    let config = Config::builder()
        .endpoints(Endpoints::from_base(&server.base_url())?)
        .build();

    Ok(Client::new(
        Credentials::new(CLIENT_ID, USERNAME, PASSWORD.to_owned()),
        config,
    )?)
}

/// Wire body of a successful token exchange.
#[must_use]
pub fn token_body(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "accessToken": access_token,
        "expiresIn": ACCESS_LIFETIME,
        "refreshToken": refresh_token,
        "refreshExpiresIn": REFRESH_LIFETIME
    })
}

#[must_use]
pub fn password_grant_body() -> Value {
    json!({
        "clientId": CLIENT_ID,
        "username": USERNAME,
        "password": PASSWORD
    })
}

/// A pair acquired `age` ago with the standard lifetimes.
#[must_use]
pub fn pair_aged(access_token: &str, refresh_token: &str, age: TimeDelta) -> TokenPair {
    TokenPair::new(
        access_token.to_owned(),
        ACCESS_LIFETIME,
        refresh_token.to_owned(),
        REFRESH_LIFETIME,
        Some(Utc::now() - age),
    )
}

/// Access token still valid.
#[must_use]
pub fn valid_pair(access_token: &str) -> TokenPair {
    pair_aged(access_token, "refresh", TimeDelta::zero())
}

/// Access token expired, refresh token still valid.
#[must_use]
pub fn access_expired_pair(access_token: &str) -> TokenPair {
    pair_aged(access_token, "refresh", TimeDelta::seconds(2700))
}

/// Both tokens expired.
#[must_use]
pub fn fully_expired_pair() -> TokenPair {
    pair_aged("old-access", "old-refresh", TimeDelta::hours(2))
}

pub fn mock_password_grant<'server>(server: &'server MockServer, access_token: &str) -> Mock<'server> {
    server.mock(|when, then| {
        when.method(POST)
            .path(PASSWORD_PATH)
            .json_body(password_grant_body());
        then.status(StatusCode::OK)
            .json_body(token_body(access_token, "refresh"));
    })
}

pub fn mock_rejected_password_grant(server: &MockServer) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path(PASSWORD_PATH);
        then.status(StatusCode::UNAUTHORIZED)
            .json_body(json!({ "message": "invalid credentials" }));
    })
}

#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn assert_stamped_between(acquired: Option<DateTime<Utc>>, before: DateTime<Utc>, after: DateTime<Utc>) {
    let acquired = acquired.unwrap();
    assert!(
        before <= acquired && acquired <= after,
        "acquired {acquired} outside of [{before}, {after}]"
    );
}
