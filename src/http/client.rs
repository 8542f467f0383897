//! The request pipeline: build, authenticate, send, refresh on 401, retry.

use log::{debug, warn};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::retry::{RetryPolicy, with_backoff};
use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::auth::TokenStore;
use crate::config::ApiConfig;
use crate::error::{AppError, ErrorKind, Failure, Severity, classify};
use crate::notify::{Notice, Notifier};
use crate::runtime::Runtime;

/// Endpoint that trades a refresh token for a new access token.
pub const REFRESH_ENDPOINT: &str = "/auth/refresh-token";

/// Per-call settings. Anything left as `None` falls back to [`ApiConfig`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub with_auth: bool,
    pub retries: Option<u32>,
    /// The caller can re-run the request, so a failure notice may offer it.
    pub retry_available: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            with_auth: true,
            retries: None,
            retry_available: false,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_auth(mut self, with_auth: bool) -> Self {
        self.with_auth = with_auth;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_retry_available(mut self, retry_available: bool) -> Self {
        self.retry_available = retry_available;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub headers: HeaderMap,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// JSON API client with bearer auth, one transparent token refresh per
/// attempt, and backoff retries.
pub struct ApiClient<T: Transport, S: TokenStore, R: Runtime, N: Notifier> {
    transport: T,
    tokens: S,
    runtime: R,
    notifier: N,
    config: ApiConfig,
}

impl<T: Transport, S: TokenStore, R: Runtime, N: Notifier> ApiClient<T, S, R, N> {
    pub fn new(transport: T, tokens: S, runtime: R, notifier: N, config: ApiConfig) -> Self {
        Self {
            transport,
            tokens,
            runtime,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn tokens(&self) -> &S {
        &self.tokens
    }

    /// Sends `options.method` to `endpoint`, retrying per the configured
    /// policy. Terminal failures are reported to the notifier and returned.
    #[tracing::instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request<D: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        let url = self.config.url(endpoint);
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let policy = RetryPolicy::from_config(
            &self.config,
            options.retries.unwrap_or(self.config.retries),
        );

        debug!("{} {} (auth: {})", options.method, url, options.with_auth);

        let result = with_backoff(&self.runtime, &policy, endpoint, || {
            self.attempt::<D>(&url, &options, timeout)
        })
        .await;

        if let Err(e) = &result {
            self.notifier
                .notify(Notice::for_error(e, options.retry_available));
        }
        result
    }

    pub async fn get<D: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        let options = RequestOptions {
            method: Method::GET,
            body: None,
            ..options
        };
        self.request(endpoint, options).await
    }

    pub async fn post<D: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        self.request_with_body(Method::POST, endpoint, body, options)
            .await
    }

    pub async fn put<D: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        self.request_with_body(Method::PUT, endpoint, body, options)
            .await
    }

    pub async fn patch<D: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        self.request_with_body(Method::PATCH, endpoint, body, options)
            .await
    }

    pub async fn delete<D: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        let options = RequestOptions {
            method: Method::DELETE,
            ..options
        };
        self.request(endpoint, options).await
    }

    async fn request_with_body<D: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<D>, AppError> {
        let body = match serde_json::to_value(body) {
            Ok(body) => body,
            Err(e) => {
                let err = classify(&Failure::Other(format!("Failed to encode request body: {}", e)));
                self.notifier.notify(Notice::for_error(&err, false));
                return Err(err);
            }
        };
        let options = RequestOptions {
            method,
            body: Some(body),
            ..options
        };
        self.request(endpoint, options).await
    }

    /// One pass through BUILD -> ACQUIRE_TOKEN -> SEND [-> REFRESH -> SEND].
    async fn attempt<D: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<ApiResponse<D>, AppError> {
        let mut request = build_request(url, options)?;

        if options.with_auth {
            // Re-read on every attempt; another request may have refreshed.
            let token = self
                .acquire_token()
                .await
                .ok_or_else(AppError::authentication_required)?;
            set_bearer(&mut request.headers, &token)?;
        }

        let response = self
            .send(request.clone(), timeout)
            .await
            .map_err(|f| classify(&f))?;

        if response.status == 401 && options.with_auth {
            return self.refresh_and_resend(request, response, timeout).await;
        }

        decode_response(response)
    }

    async fn refresh_and_resend<D: DeserializeOwned>(
        &self,
        mut request: HttpRequest,
        unauthorized: HttpResponse,
        timeout: Duration,
    ) -> Result<ApiResponse<D>, AppError> {
        let original = status_failure(&unauthorized);

        let Some(token) = self.refresh_access_token().await else {
            debug!("Access token rejected and refresh failed");
            return Err(classify(&original));
        };
        set_bearer(&mut request.headers, &token)?;

        match self.send(request, timeout).await {
            Ok(response) if response.is_success() => decode_response(response),
            Ok(response) => {
                debug!("Request still failing after refresh: HTTP {}", response.status);
                Err(classify(&original))
            }
            Err(e) => {
                debug!("Request failed after refresh: {}", e);
                Err(classify(&original))
            }
        }
    }

    /// Races the transport against `timeout`. Losing the race drops the
    /// in-flight request.
    async fn send(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse, Failure> {
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Failure::from(e)),
            Err(_) => {
                debug!("Request exceeded {}ms deadline", timeout.as_millis());
                Err(Failure::Timeout)
            }
        }
    }

    async fn acquire_token(&self) -> Option<String> {
        match self.tokens.get().access_token {
            Some(token) => Some(token),
            None => {
                debug!("No access token stored, trying refresh");
                self.refresh_access_token().await
            }
        }
    }

    /// Exchanges the stored refresh token for a new access token. Any
    /// failure clears the store and yields `None`.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_access_token(&self) -> Option<String> {
        let Some(refresh_token) = self.tokens.get().refresh_token else {
            self.clear_tokens();
            return None;
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = match serde_json::to_vec(&RefreshRequest {
            refresh_token: &refresh_token,
        }) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode refresh request: {}", e);
                self.clear_tokens();
                return None;
            }
        };
        let request = HttpRequest {
            method: Method::POST,
            url: self.config.url(REFRESH_ENDPOINT),
            headers,
            body: Some(body),
        };

        let response = match self.send(request, self.config.timeout).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!("Token refresh rejected with HTTP {}", response.status);
                self.clear_tokens();
                return None;
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                self.clear_tokens();
                return None;
            }
        };

        let refreshed: RefreshResponse = match serde_json::from_slice(&response.body) {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("Token refresh returned an unexpected body: {}", e);
                self.clear_tokens();
                return None;
            }
        };

        let refresh_token = refreshed.refresh_token.unwrap_or(refresh_token);
        if let Err(e) = self.tokens.set(&refreshed.access_token, &refresh_token) {
            warn!("Failed to store refreshed tokens: {:#}", e);
        }
        debug!("Access token refreshed");
        Some(refreshed.access_token)
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!("Failed to clear tokens: {:#}", e);
        }
    }
}

fn build_request(url: &str, options: &RequestOptions) -> Result<HttpRequest, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in &options.headers {
        headers.insert(name.clone(), value.clone());
    }

    let body = match &options.body {
        Some(body) if options.method != Method::GET => Some(serde_json::to_vec(body).map_err(
            |e| classify(&Failure::Other(format!("Failed to encode request body: {}", e))),
        )?),
        _ => None,
    };

    Ok(HttpRequest {
        method: options.method.clone(),
        url: url.to_string(),
        headers,
        body,
    })
}

fn set_bearer(headers: &mut HeaderMap, token: &str) -> Result<(), AppError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
        AppError::new(ErrorKind::Authentication)
            .with_message("Stored access token is not a valid header value")
            .with_severity(Severity::Warning)
            .with_code("AUTH_REQUIRED")
    })?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

fn status_failure(response: &HttpResponse) -> Failure {
    let body = serde_json::from_slice(&response.body)
        .unwrap_or_else(|_| Value::Object(Default::default()));
    Failure::Status {
        status: response.status,
        body,
    }
}

fn decode_response<D: DeserializeOwned>(response: HttpResponse) -> Result<ApiResponse<D>, AppError> {
    if !response.is_success() {
        return Err(classify(&status_failure(&response)));
    }

    let value = if response.is_json() {
        if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response.body)
                .map_err(|e| classify(&Failure::Decode(e.to_string())))?
        }
    } else {
        Value::String(String::from_utf8_lossy(&response.body).into_owned())
    };

    let data = serde_json::from_value(value).map_err(|e| classify(&Failure::Decode(e.to_string())))?;

    Ok(ApiResponse {
        data,
        status: response.status,
        headers: response.headers,
    })
}
