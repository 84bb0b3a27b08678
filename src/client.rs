//! Client for the Samplify API.
//!
//! Every call made through [`Client`] is authenticated: the session's access token is checked
//! (and renewed when needed) before sending, and a call rejected with `401 Unauthorized` is sent
//! exactly once more after a fresh password grant.
//!
//! # Example
//!
//! ```no_run
//! use samplify_client_sdk::auth::Credentials;
//! use samplify_client_sdk::client::Environment;
//! use samplify_client_sdk::query::{Filter, QueryField, QueryOptions};
//! use samplify_client_sdk::{Client, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::new("client-id", "user@example.com", "password".to_owned());
//! let config = Config::builder()
//!     .endpoints(Environment::Uat.endpoints()?)
//!     .build();
//! let client = Client::new(credentials, config)?;
//!
//! let options = QueryOptions::builder()
//!     .filters(vec![Filter::new(QueryField::Title, "Samplify Client Test")])
//!     .limit(50)
//!     .build();
//! let projects = client.projects(&options).await?;
//! println!("{}", projects.body);
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, Method, Request, StatusCode};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::{Credentials, TokenPair, TokenStore};
use crate::error::Error;
use crate::query::{QueryOptions, QuerySeparator};
use crate::quota::TemplateCriteria;
use crate::types::ApiResponse;
use crate::{Result, endpoint, endpoint_segments, send};

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const SWITCH_COMPANY_PATH: &str = "/switchCompany";

/// A deployment of the Samplify API.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    Local,
    Dev,
    #[default]
    Uat,
    Prod,
}

impl Environment {
    /// Host serving every API surface of this environment.
    #[must_use]
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Local => "http://localhost:8090",
            Environment::Dev => "https://api.dev.pe.dynata.com",
            Environment::Uat => "https://api.uat.pe.dynata.com",
            Environment::Prod => "https://api.researchnow.com",
        }
    }

    pub fn endpoints(self) -> Result<Endpoints> {
        Endpoints::from_base(self.base_url())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "uat" => Ok(Environment::Uat),
            "prod" => Ok(Environment::Prod),
            _ => Err(Error::validation(
                "one of local/dev/uat/prod only are allowed",
            )),
        }
    }
}

/// Base URLs of the API surfaces a [`Client`] talks to.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Sample API, home of projects, line items, events and templates.
    pub api: Url,
    /// Token exchanges, logout and company switching.
    pub auth: Url,
    pub internal: Url,
    pub status: Url,
    /// Gateway health check.
    pub gateway: Url,
}

impl Endpoints {
    #[must_use]
    pub fn new(api: Url, auth: Url, internal: Url, status: Url, gateway: Url) -> Self {
        Self {
            api,
            auth,
            internal,
            status,
            gateway,
        }
    }

    /// Lays out every surface under `base` the way the hosted environments do.
    pub fn from_base(base: &str) -> Result<Self> {
        let base = Url::parse(base.trim())?;

        Ok(Self {
            api: endpoint(&base, "/sample/v1")?,
            auth: endpoint(&base, "/auth/v1")?,
            internal: endpoint(&base, "/internal/v1")?,
            status: endpoint(&base, "/status")?,
            gateway: endpoint(&base, "/status/gateway")?,
        })
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Environment::default()
            .endpoints()
            .expect("Preset endpoints should be valid URLs")
    }
}

/// Configuration for [`Client`]
#[non_exhaustive]
#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// Where calls are sent. Defaults to the UAT environment.
    #[builder(default)]
    endpoints: Endpoints,
    /// Upper bound on each HTTP exchange, token exchanges included. Defaults to twenty seconds.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
    /// Separator used when rendering [`QueryOptions`].
    #[builder(default)]
    query_separator: QuerySeparator,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

impl Config {
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn query_separator(&self) -> QuerySeparator {
        self.query_separator
    }
}

/// A file sent as `multipart/form-data`, along with a free-text message.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub file: Vec<u8>,
    pub message: String,
}

impl Upload {
    #[must_use]
    pub fn new(file_name: &str, file: Vec<u8>, message: &str) -> Self {
        Self {
            file_name: file_name.to_owned(),
            file,
            message: message.to_owned(),
        }
    }

    fn form(&self) -> Form {
        let file = Part::bytes(self.file.clone()).file_name(self.file_name.clone());

        Form::new()
            .part("file", file)
            .text("message", self.message.clone())
    }
}

/// Body of a dispatched call, kept so the call can be rebuilt for its retry.
enum Payload {
    Json(Vec<u8>),
    Multipart(Upload),
}

/// Outcome of sending a call once.
enum Attempt {
    Success(ApiResponse),
    /// The server answered `401 Unauthorized`.
    Unauthorized(Error),
    Failed(Error),
}

impl Attempt {
    fn into_result(self) -> Result<ApiResponse> {
        match self {
            Attempt::Success(response) => Ok(response),
            Attempt::Unauthorized(e) | Attempt::Failed(e) => Err(e),
        }
    }
}

#[derive(Debug)]
struct ClientInner {
    config: Config,
    /// Shared by token exchanges and API calls.
    client: ReqwestClient,
    tokens: TokenStore,
}

/// Authenticated client for the Samplify API.
///
/// [`Client`] is cheap to clone and thread-safe; clones share one session.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client with an empty session. No call is made until one is needed.
    pub fn new(credentials: Credentials, config: Config) -> Result<Client> {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, HeaderValue::from_static("samplify-client-sdk"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = ReqwestClient::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let tokens = TokenStore::new(credentials, config.endpoints.auth.clone(), client.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                client,
                tokens,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.config.endpoints
    }

    /// Renders `options` with the configured separator.
    #[must_use]
    pub fn query_params(&self, options: &QueryOptions) -> String {
        options.query_params(self.inner.config.query_separator)
    }

    /// Sends `body` as JSON to `host` + `path` on behalf of the session.
    ///
    /// A missing body is sent as `null`. Statuses of 400 and above are returned as
    /// [`crate::error::Status`] errors; a `401` is retried once after a fresh password grant.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        host: &Url,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse> {
        self.send_json(method, endpoint(host, path)?, body).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<ApiResponse> {
        let payload = Payload::Json(serde_json::to_vec(&body)?);

        self.dispatch(method, url, payload).await
    }

    /// Like [`Client::request`], decoding a successful body into `T`.
    pub async fn request_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        host: &Url,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        self.request(method, host, path, body).await?.json()
    }

    /// Sends `upload` as `multipart/form-data`, with the same authentication and retry rules as
    /// [`Client::request`].
    pub async fn upload(
        &self,
        method: Method,
        host: &Url,
        path: &str,
        upload: Upload,
    ) -> Result<ApiResponse> {
        let url = endpoint(host, path)?;

        self.dispatch(method, url, Payload::Multipart(upload)).await
    }

    async fn dispatch(&self, method: Method, url: Url, payload: Payload) -> Result<ApiResponse> {
        let access_token = self.inner.tokens.ensure_valid().await?;

        match self.attempt(&method, &url, &payload, &access_token).await {
            Attempt::Unauthorized(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %method,
                    url = %url,
                    error = %e,
                    "access token rejected, re-authenticating once"
                );
                #[cfg(not(feature = "tracing"))]
                let _: &Error = &e;

                let access_token = self.inner.tokens.reacquire(&access_token).await?;

                self.attempt(&method, &url, &payload, &access_token)
                    .await
                    .into_result()
            }
            attempt => attempt.into_result(),
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        payload: &Payload,
        access_token: &SecretString,
    ) -> Attempt {
        let result = match self.build_request(method, url, payload, access_token) {
            Ok(request) => send(&self.inner.client, request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => Attempt::Success(response),
            Err(e) if e.status_code() == Some(StatusCode::UNAUTHORIZED) => Attempt::Unauthorized(e),
            Err(e) => Attempt::Failed(e),
        }
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        payload: &Payload,
        access_token: &SecretString,
    ) -> Result<Request> {
        let mut builder = self.inner.client.request(method.clone(), url.clone());

        let token = access_token.expose_secret();
        if !token.is_empty() {
            builder = builder.bearer_auth(token);
        }

        let builder = match payload {
            Payload::Json(body) => builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone()),
            Payload::Multipart(upload) => builder.multipart(upload.form()),
        };

        Ok(builder.build()?)
    }

    /// Performs a password grant now, replacing the session's tokens.
    pub async fn authenticate(&self) -> Result<TokenPair> {
        self.inner.tokens.acquire().await
    }

    /// Exchanges the refresh token for a new pair now.
    pub async fn refresh_token(&self) -> Result<TokenPair> {
        self.inner.tokens.refresh().await
    }

    /// Revokes the session on the server and forgets its tokens. Skipped when the access token
    /// has already expired.
    pub async fn logout(&self) -> Result<()> {
        self.inner.tokens.logout().await
    }

    /// The session's current tokens, if any were acquired.
    pub async fn tokens(&self) -> Option<TokenPair> {
        self.inner.tokens.snapshot().await
    }

    /// Replaces the session's tokens, e.g. with a pair saved from an earlier process.
    pub async fn restore_tokens(&self, pair: TokenPair) {
        self.inner.tokens.restore(pair).await;
    }

    /// Moves the session to another company the user belongs to. The pair returned by the server
    /// replaces the session's tokens.
    ///
    /// The request carries the session's refresh token, so a retry after `401 Unauthorized` is
    /// rebuilt with the refresh token of the re-acquired pair.
    pub async fn switch_company(&self, company_id: i32, client_secret: &str) -> Result<TokenPair> {
        let client_secret = required("clientSecret", client_secret)?;
        let url = endpoint(&self.inner.config.endpoints.auth, SWITCH_COMPANY_PATH)?;

        let access_token = self.inner.tokens.ensure_valid().await?;
        let mut acquired = Utc::now();
        let payload = self.switch_company_payload(company_id, client_secret).await?;

        let response = match self
            .attempt(&Method::POST, &url, &payload, &access_token)
            .await
        {
            Attempt::Unauthorized(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    company_id,
                    error = %e,
                    "access token rejected, re-authenticating once"
                );
                #[cfg(not(feature = "tracing"))]
                let _: &Error = &e;

                let access_token = self.inner.tokens.reacquire(&access_token).await?;
                acquired = Utc::now();
                let payload = self.switch_company_payload(company_id, client_secret).await?;

                self.attempt(&Method::POST, &url, &payload, &access_token)
                    .await
                    .into_result()?
            }
            attempt => attempt.into_result()?,
        };

        let pair = response.json::<TokenPair>()?.stamped(acquired);
        self.inner.tokens.restore(pair.clone()).await;

        #[cfg(feature = "tracing")]
        tracing::debug!(company_id, "switched company");

        Ok(pair)
    }

    async fn switch_company_payload(&self, company_id: i32, client_secret: &str) -> Result<Payload> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SwitchCompany<'req> {
            client_id: &'req str,
            client_secret: &'req str,
            refresh_token: &'req str,
            company_id: i32,
        }

        let current = self.inner.tokens.snapshot().await;
        let body = SwitchCompany {
            client_id: self.inner.tokens.credentials().client_id(),
            client_secret,
            refresh_token: current
                .as_ref()
                .map_or("", |pair| pair.refresh_token().expose_secret()),
            company_id,
        };

        Ok(Payload::Json(serde_json::to_vec(&body)?))
    }

    /// Checks the API gateway's health.
    pub async fn health_status(&self) -> Result<ApiResponse> {
        self.request::<()>(Method::GET, &self.inner.config.endpoints.gateway, "", None)
            .await
    }

    /// Lists the projects visible to the session.
    pub async fn projects(&self, options: &QueryOptions) -> Result<ApiResponse> {
        let path = format!("/projects{}", self.query_params(options));

        self.request::<()>(Method::GET, &self.inner.config.endpoints.api, &path, None)
            .await
    }

    /// Lists the line items of a project.
    pub async fn line_items(
        &self,
        ext_project_id: &str,
        options: &QueryOptions,
    ) -> Result<ApiResponse> {
        let ext_project_id = required("extProjectId", ext_project_id)?;
        let url = endpoint_segments(
            &self.inner.config.endpoints.api,
            &["projects", ext_project_id, "lineItems"],
            &self.query_params(options),
        )?;

        self.send_json::<()>(Method::GET, url, None).await
    }

    /// Lists project and line item events.
    pub async fn events(&self, options: &QueryOptions) -> Result<ApiResponse> {
        let path = format!("/events{}", self.query_params(options));

        self.request::<()>(Method::GET, &self.inner.config.endpoints.api, &path, None)
            .await
    }

    /// Creates a quota plan template. The template is validated before anything is sent.
    pub async fn create_template(&self, template: &TemplateCriteria) -> Result<ApiResponse> {
        template.validate()?;

        self.request(
            Method::POST,
            &self.inner.config.endpoints.api,
            "/templates/quotaPlan",
            Some(template),
        )
        .await
    }

    /// Replaces a quota plan template. The template is validated before anything is sent.
    pub async fn update_template(
        &self,
        id: u64,
        template: &TemplateCriteria,
    ) -> Result<ApiResponse> {
        template.validate()?;

        self.request(
            Method::POST,
            &self.inner.config.endpoints.api,
            &format!("/templates/quotaPlan/{id}"),
            Some(template),
        )
        .await
    }

    pub async fn delete_template(&self, id: u64) -> Result<ApiResponse> {
        self.request::<()>(
            Method::DELETE,
            &self.inner.config.endpoints.api,
            &format!("/templates/quotaPlan/{id}"),
            None,
        )
        .await
    }

    /// Uploads a reconciliation file for a project.
    pub async fn upload_reconcile(
        &self,
        ext_project_id: &str,
        upload: Upload,
    ) -> Result<ApiResponse> {
        let ext_project_id = required("extProjectId", ext_project_id)?;
        let url = endpoint_segments(
            &self.inner.config.endpoints.api,
            &["projects", ext_project_id, "reconcile"],
            "",
        )?;

        self.dispatch(Method::POST, url, Payload::Multipart(upload))
            .await
    }
}

fn required<'value>(field: &str, value: &'value str) -> Result<&'value str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("required field is empty: {field}")));
    }

    Ok(value)
}
