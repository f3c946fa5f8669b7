//! Nimbus API client
//!
//! # Creating a new api client
//!
//! - [new](NimbusClient::new) - create new client with default configuration
//! - [with_config](NimbusClient::with_config) - create client with custom configuration
//!
//! The client is scoped to one API endpoint (a project's API host). Calls are
//! made through [`EnvironmentHandle`]s obtained from
//! [environment](NimbusClient::environment).

use std::sync::Arc;

use tracing::debug;

use crate::{
    Result, auth::SecretToken, config::ClientConfig, environment::EnvironmentHandle,
    http_client::HttpClient,
};

/// Async client for the Nimbus platform API.
#[derive(Debug, Clone)]
pub struct NimbusClient {
    http: Arc<HttpClient>,
    config: ClientConfig,
}

impl NimbusClient {
    /// Create a client with default configuration (url from NIMBUS_URL).
    pub fn new(app_name: &str) -> Result<Self> {
        Self::with_config(ClientConfig::default().app_name(app_name))
    }

    /// Create a client with custom configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        debug!(base_url = %config.base_url, "creating client");
        let builder = reqwest::ClientBuilder::new()
            .user_agent(config.app_name.clone())
            .timeout(config.request_timeout);
        let http = HttpClient::new(builder, config.base_url.clone(), config.max_retries)?;
        Ok(Self {
            http: Arc::new(http),
            config,
        })
    }

    /// Returns the client configuration.
    pub fn get_config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sets the bearer token used for authenticated requests.
    pub fn set_token(&self, token: SecretToken) {
        self.http.set_token(&token);
    }

    /// Clears the bearer token.
    pub fn clear_token(&self) {
        self.http.clear_token();
    }

    /// True if a token has been set.
    pub fn has_token(&self) -> bool {
        self.http.has_token()
    }

    /// Returns a handle scoped to one environment.
    pub fn environment(&self, environment_id: impl Into<String>) -> EnvironmentHandle {
        EnvironmentHandle {
            http: self.http.clone(),
            id: environment_id.into(),
        }
    }
}
