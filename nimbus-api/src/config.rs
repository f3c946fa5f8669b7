//! Client configuration. Defines endpoint url, retry limits, and other settings.

use std::time::Duration;

/// Environment variable overriding the API base url
pub const NIMBUS_URL_ENV: &str = "NIMBUS_URL";

/// Environment variable holding the API token
pub const NIMBUS_TOKEN_ENV: &str = "NIMBUS_TOKEN";

/// Environment variable overriding `max_retries`
pub const NIMBUS_RETRY_MAX_ENV: &str = "NIMBUS_RETRY_MAX";

/// Default API endpoint
pub const NIMBUS_DEFAULT_URL: &str = "https://api.nimbus.cloud";

/// API version sent with every request
pub const NIMBUS_API_VERSION: &str = "2026-06";
pub(crate) const NIMBUS_API_HEADER: &str = "Nimbus-Version";

pub(crate) const DEFAULT_SERVICE_NAME: &str = "nimbus";
pub(crate) const MAX_RETRIES_DEFAULT: u32 = 3;
pub(crate) const RETRY_BACKOFF_BASE_MS: u64 = 250;
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Nimbus client.
///
/// ```rust,no_run
/// use nimbus::prelude::*;
/// # fn create_client() -> Result<NimbusClient, NimbusError> {
/// let client = NimbusClient::with_config(ClientConfig::default().app_name("my-app"))?;
/// # Ok(client)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base url for all nimbus HTTP/REST api requests.
    /// If not provided in config, url is determined by:
    /// * the environment variable NIMBUS_URL, if defined, or
    /// * `NIMBUS_DEFAULT_URL`
    pub base_url: String,

    /// Application name used for the User-Agent header. In application code,
    /// you may want to use `env!("CARGO_BIN_NAME")` to use the executable name.
    pub app_name: String,

    /// Maximum retries for connection failures and retryable server errors
    /// on idempotent requests. Defaults to 3, or the env override
    /// NIMBUS_RETRY_MAX if set.
    pub max_retries: u32,

    /// Per-request timeout applied by the http client.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: std::env::var(NIMBUS_URL_ENV).unwrap_or(NIMBUS_DEFAULT_URL.to_string()),
            app_name: DEFAULT_SERVICE_NAME.to_string(),
            max_retries: std::env::var(NIMBUS_RETRY_MAX_ENV)
                .ok()
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(MAX_RETRIES_DEFAULT),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Sets the base url.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Sets the app_name.
    pub fn app_name(self, app_name: &str) -> Self {
        ClientConfig {
            app_name: app_name.to_string(),
            ..self
        }
    }

    /// Sets the retry cap for the http middleware.
    pub fn max_retries(self, max_retries: u32) -> Self {
        ClientConfig {
            max_retries,
            ..self
        }
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(self, request_timeout: Duration) -> Self {
        ClientConfig {
            request_timeout,
            ..self
        }
    }
}
