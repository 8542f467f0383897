use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    auth::FileTokenStore,
    config::ApiConfig,
    http::{ApiClient, ReqwestTransport},
    notify::LogNotifier,
    runtime::RealRuntime,
};

/// The client every CLI command talks through.
pub type CliClient = ApiClient<ReqwestTransport, FileTokenStore<RealRuntime>, RealRuntime, LogNotifier>;

/// Settings collected from global command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub token_file: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub no_validation_retry: bool,
}

impl Config {
    pub fn api_config(&self) -> ApiConfig {
        let mut config = ApiConfig::from_runtime(&RealRuntime, self.api_url.clone());
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.retries {
            config = config.with_retries(retries);
        }
        if self.no_validation_retry {
            config = config.with_retry_validation(false);
        }
        config
    }

    pub fn token_store(&self) -> Result<FileTokenStore<RealRuntime>> {
        match &self.token_file {
            Some(path) => Ok(FileTokenStore::new(RealRuntime, path.clone())),
            None => FileTokenStore::at_default_location(RealRuntime),
        }
    }

    pub fn build_client(&self) -> Result<CliClient> {
        let tokens = self.token_store()?;
        debug!("Using token file {:?}", tokens.path());

        Ok(ApiClient::new(
            ReqwestTransport::build_default()?,
            tokens,
            RealRuntime,
            LogNotifier,
            self.api_config(),
        ))
    }
}
