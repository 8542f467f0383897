use log::debug;
use std::time::Duration;

use crate::runtime::Runtime;

/// Environment variable that overrides the API base URL.
pub const API_URL_ENV: &str = "KINETIC_API_URL";

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Default per-send deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Retries after the first attempt when the caller does not say otherwise.
pub const DEFAULT_RETRIES: u32 = 1;

/// Delay before the first retry; doubled for each retry after that.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Settings shared by every request an [`ApiClient`](crate::http::ApiClient) makes.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub initial_delay: Duration,
    /// Whether 400/422 responses go back through the retry loop.
    pub retry_validation: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            retry_validation: true,
        }
    }
}

impl ApiConfig {
    /// Builds a config from defaults, the environment, then `api_url`.
    #[tracing::instrument(skip(runtime))]
    pub fn from_runtime<R: Runtime>(runtime: &R, api_url: Option<String>) -> Self {
        let base_url = api_url
            .or_else(|| runtime.env_var(API_URL_ENV).ok())
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        debug!("Using API base URL {}", base_url);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_retry_validation(mut self, retry_validation: bool) -> Self {
        self.retry_validation = retry_validation;
        self
    }

    /// Joins the base URL and an endpoint such as `/exercises`.
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') || endpoint.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}
