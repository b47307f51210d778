//! API client for communicating with the Librarian REST API.
//!
//! Every call goes through `ApiClient::send`, which runs the request
//! pipeline in order: attach the stored bearer token, send with bounded
//! retry of transient failures, repair a single 401 by refreshing the
//! token and replaying once, then normalize the body into an envelope.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::config::ClientConfig;
use crate::models::AuthPayload;

use super::envelope::{ApiResponse, Envelope};
use super::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use super::pipeline::{self, AuthDecision, RetryDecision};
use super::ApiError;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// Everything needed to send a call again verbatim.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub body: Option<Value>,
}

impl PendingRequest {
    pub fn new(
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Self, ApiError> {
        if !is_relative_route(path) {
            return Err(ApiError::InvalidPath(path.to_string()));
        }
        Ok(Self {
            method,
            path: path.to_string(),
            headers: options.headers,
            query: options.query,
            timeout: options.timeout,
            body,
        })
    }
}

/// A route like `/titles/42?page=2`: rooted, no scheme, no authority.
/// Only the part before the query or fragment is checked for a scheme.
fn is_relative_route(path: &str) -> bool {
    let route = path.split(['?', '#']).next().unwrap_or(path);
    route.starts_with('/')
        && !route.starts_with("//")
        && !route.contains("://")
        && !path.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Gateway client for the Librarian backend.
/// Clone is cheap - clones share the connection pool, cookie jar, session
/// and event channel.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
    session: Arc<Session>,
    /// Serializes token repairs so concurrent 401s trigger one refresh
    refresh_gate: Arc<Mutex<()>>,
    events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, ApiError> {
        config
            .validate()
            .map_err(|e| ApiError::Config(format!("{:#}", e)))?;

        // The cookie jar carries the refresh credential set at login
        let http = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            config: Arc::new(config),
            session: Arc::new(session),
            refresh_gate: Arc::new(Mutex::new(())),
            events,
        })
    }

    /// Build a client with the session backend the configuration selects
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let session =
            Session::from_config(&config).map_err(|e| ApiError::Config(format!("{:#}", e)))?;
        Self::new(config, session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ===== Request pipeline =====

    /// Issue one logical call.
    ///
    /// Structured error responses are returned as `Ok` with
    /// `success == false`; `Err` means no usable response was obtained.
    pub async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ApiResponse<Value>, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        let request = PendingRequest::new(method, path, body, options)?;
        self.execute(&request).await
    }

    /// `send` with the envelope's data decoded into `T`.
    pub async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(method, path, body, options).await?.decode()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        self.get_with(path, RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.send_json(Method::GET, path, None::<&()>, options).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        self.send_json(Method::DELETE, path, None::<&()>, RequestOptions::default())
            .await
    }

    /// Run the pipeline for a captured request.
    pub async fn execute(&self, request: &PendingRequest) -> Result<ApiResponse<Value>, ApiError> {
        let routes = &self.config.routes;
        let is_auth_endpoint = routes.is_auth_endpoint(&request.path);
        let budget = pipeline::attempt_budget(&self.config.retry, routes, &request.path);

        let mut token = self.session.token();
        let mut repaired = false;

        loop {
            let (status, body) = self.dispatch(request, token.as_deref(), budget).await?;

            match pipeline::decide_auth(status, repaired, is_auth_endpoint) {
                AuthDecision::Repair => {
                    debug!(method = %request.method, path = %request.path, "Unauthorized, repairing session");
                    let fresh = self
                        .repair_session(token.as_deref())
                        .await
                        .ok_or(ApiError::SessionInvalid)?;
                    token = Some(fresh);
                    repaired = true;
                }
                AuthDecision::Surface => {
                    if repaired && status == StatusCode::UNAUTHORIZED {
                        warn!(path = %request.path, "Replay after refresh was still unauthorized");
                    }
                    let envelope = Envelope::from_body(status, &body)?;
                    return Ok(ApiResponse { status, envelope });
                }
            }
        }
    }

    /// Send with bounded retry of transient failures.
    async fn dispatch(
        &self,
        request: &PendingRequest,
        token: Option<&str>,
        budget: u32,
    ) -> Result<(StatusCode, Vec<u8>), ApiError> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(method = %request.method, path = %request.path, attempt = attempts, "Sending request");

            let err = match self.attempt(request, token).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let class = pipeline::classify_error(&err);
            match pipeline::decide_retry(class, attempts, budget, &self.config.retry) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        path = %request.path,
                        attempt = attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    warn!(path = %request.path, attempts = attempts, error = %err, "Giving up on request");
                    return Err(ApiError::Transport { attempts, source: err });
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &PendingRequest,
        token: Option<&str>,
    ) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.config.endpoint(&request.path))
            .header(header::ACCEPT, "application/json")
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }

    /// Obtain a usable token after a 401 sent with `stale`.
    ///
    /// Returns `None` when the session cannot be repaired; in that case the
    /// stored token is gone and `SessionInvalidated` has been emitted.
    async fn repair_session(&self, stale: Option<&str>) -> Option<String> {
        let _guard = self.refresh_gate.lock().await;

        match self.session.token() {
            Some(current) if Some(current.as_str()) != stale => {
                debug!("Token already refreshed by a concurrent call");
                return Some(current);
            }
            None if stale.is_some() => {
                debug!("Session cleared by a concurrent call");
                return None;
            }
            _ => {}
        }

        if self.refresh_token().await {
            return self.session.token();
        }

        if let Err(e) = self.session.clear() {
            warn!(error = %format!("{:#}", e), "Failed to clear stored session");
        }
        info!("Session invalidated, re-authentication required");
        self.emit(SessionEvent::SessionInvalidated);
        None
    }

    /// Exchange the out-of-band refresh credential for a new bearer token.
    ///
    /// Single attempt, no bearer header. On success the new token is stored.
    pub async fn refresh_token(&self) -> bool {
        match self.request_new_token().await {
            Ok(token) => {
                if let Err(e) = self.session.replace(&token) {
                    warn!(error = %format!("{:#}", e), "Failed to persist refreshed token");
                }
                info!("Session token refreshed");
                self.emit(SessionEvent::TokenRefreshed);
                true
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Token refresh failed");
                false
            }
        }
    }

    async fn request_new_token(&self) -> anyhow::Result<String> {
        let url = self.config.endpoint(&self.config.routes.refresh);
        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .context("Failed to send refresh request")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Refresh endpoint returned {}", status);
        }

        let body = response.bytes().await.context("Failed to read refresh response")?;
        let envelope: Envelope<AuthPayload> = serde_json::from_slice(&body)
            .context("Failed to parse refresh response")?;
        if !envelope.success {
            bail!(
                "Refresh rejected: {}",
                envelope.error.or(envelope.message).unwrap_or_default()
            );
        }

        match envelope.data {
            Some(payload) if !payload.access_token.is_empty() => Ok(payload.access_token),
            _ => bail!("Refresh response did not include a token"),
        }
    }
}
