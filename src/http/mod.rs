//! HTTP request pipeline with token handling, timeouts and retry logic.

mod client;
mod retry;
mod transport;

pub use client::{ApiClient, ApiResponse, REFRESH_ENDPOINT, RequestOptions};
pub use retry::{RetryPolicy, with_backoff};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
