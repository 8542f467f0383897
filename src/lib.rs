pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
pub mod runtime;

pub use config::ApiConfig;
pub use error::{AppError, ErrorKind, Failure, Severity, classify};
pub use http::{ApiClient, ApiResponse, RequestOptions};
