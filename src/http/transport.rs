//! The wire-level seam of the request pipeline.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method};

use crate::error::Failure;

/// A fully built request, ready to go over the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A response with its body already read.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"))
    }
}

/// Failures that happen before any response is available.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Timeout(String),
    Network(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout(msg) => write!(f, "timed out: {}", msg),
            TransportError::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => Failure::Timeout,
            TransportError::Network(msg) => Failure::Network(msg),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request. Non-success statuses are responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a reqwest [`Client`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// A client that keeps cookies between requests, so credentials set by
    /// the API are sent back.
    pub fn build_default() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("kinetic-cli")
            .cookie_store(true)
            .build()?;
        Ok(Self::new(client))
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!("{} {}...", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

        debug!("Received HTTP {} ({} bytes)", status, body.len());

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, HeaderValue};

    fn request(method: Method, url: String) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_send_returns_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/exercises")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 1}]"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let response = transport
            .send(request(Method::GET, format!("{}/exercises", server.url())))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert!(response.is_json());
        assert_eq!(response.body, br#"[{"id": 1}]"#);
    }

    #[tokio::test]
    async fn test_send_passes_error_status_through() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let response = transport
            .send(request(Method::GET, format!("{}/missing", server.url())))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert!(!response.is_json());
    }

    #[tokio::test]
    async fn test_send_forwards_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/appointments")
            .match_header("authorization", "Bearer abc")
            .match_body(r#"{"day":"monday"}"#)
            .with_status(201)
            .create_async()
            .await;

        let mut req = request(Method::POST, format!("{}/appointments", server.url()));
        req.headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        req.body = Some(br#"{"day":"monday"}"#.to_vec());

        let transport = ReqwestTransport::new(Client::new());
        let response = transport.send(req).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_network_error() {
        let transport = ReqwestTransport::new(Client::new());
        let result = transport
            .send(request(Method::GET, "http://127.0.0.1:1/".to_string()))
            .await;

        assert!(matches!(result, Err(TransportError::Network(_))));
    }

    #[test]
    fn test_transport_error_into_failure() {
        assert_eq!(
            Failure::from(TransportError::Timeout("slow".into())),
            Failure::Timeout
        );
        assert_eq!(
            Failure::from(TransportError::Network("reset".into())),
            Failure::Network("reset".into())
        );
    }

    #[test]
    fn test_build_default() {
        assert!(ReqwestTransport::build_default().is_ok());
    }
}
