//! HttpClient middleware used by NimbusClient
//!
//! Responsible for
//!  - handling all HTTP api requests
//!  - logging/tracing
//!  - retries and backoff (for timeouts, connection errors, and retryable
//!    server status codes on idempotent requests)
//!  - mapping http status codes into typed errors

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{ClientBuilder, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use snafu::prelude::*;
use tracing::{debug, error, trace, warn};

use crate::{
    Result,
    auth::SecretToken,
    config::{NIMBUS_API_HEADER, NIMBUS_API_VERSION, RETRY_BACKOFF_BASE_MS},
    error::{HttpSnafu, NimbusError, SerializationSnafu},
};

/// status codes where it's ok to retry and backoff
fn retry_for_status(code: StatusCode) -> bool {
    matches!(
        code,
        StatusCode::REQUEST_TIMEOUT /* 408 */
            | StatusCode::TOO_MANY_REQUESTS /* 429 */
            | StatusCode::BAD_GATEWAY /* 502 */
            | StatusCode::SERVICE_UNAVAILABLE /* 503 */
            | StatusCode::GATEWAY_TIMEOUT /* 504 */
    )
}

// retries are only safe when the server can't have committed a side effect
fn is_idempotent_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

#[derive(Clone, Default)]
pub(crate) struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body", &self.body.as_ref().map(|b| b.len()).unwrap_or(0))
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct HttpClient {
    pub client: reqwest::Client,

    /// Base URL for API requests (e.g., "https://api.nimbus.cloud")
    pub base_url: String,

    pub token: Arc<Mutex<Option<SecretToken>>>,

    // Max retries for connection failures and retryable statuses
    max_retries: u32,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder, base_url: String, max_retries: u32) -> Result<Self> {
        let client = builder.build().context(HttpSnafu {
            method: "client-init",
            url: "",
        })?;
        Ok(HttpClient {
            client,
            base_url,
            token: Arc::new(Mutex::new(None)),
            max_retries,
        })
    }

    /// Returns true if a token has been set.
    pub fn has_token(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Sets the API token for authenticated requests.
    pub fn set_token(&self, token: &SecretToken) {
        let mut write_token = self.token.lock();
        *write_token = Some(token.clone());
    }

    /// Clears the token if set.
    pub fn clear_token(&self) {
        let mut write_token = self.token.lock();
        *write_token = None;
    }

    /// Makes an authenticated GET request.
    pub(crate) async fn get_request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<T> {
        let req = HttpRequest {
            method: Method::GET,
            path: path.into(),
            query,
            body: None,
        };
        self.send(req).await
    }

    /// Makes an authenticated POST request with JSON body.
    pub(crate) async fn post_request<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let req = HttpRequest {
            method: Method::POST,
            path: path.into(),
            query: Default::default(),
            body: Some(Bytes::from(
                serde_json::to_vec(body).context(SerializationSnafu)?,
            )),
        };
        self.send(req).await
    }

    /// This function handles all nimbus rest api requests
    /// - retries up to N times for connection failures, server timeouts, and
    ///   retryable status codes (idempotent methods only)
    /// - maps http error codes into NimbusErrors
    /// - deserializes json response body into return type T
    pub(crate) async fn send<T: DeserializeOwned>(&self, req: HttpRequest) -> Result<T> {
        let mut attempt = 0u32;

        let token = {
            let token = self.token.lock().clone();
            token.ok_or_else(|| NimbusError::Auth {
                message: "API token not set. Call set_token() first.".to_string(),
            })?
        };
        let full_url = format!("{}{}", self.base_url, req.path);
        let req_builder = self
            .client
            .request(req.method.clone(), &full_url)
            .query(&req.query)
            .header(NIMBUS_API_HEADER, NIMBUS_API_VERSION);
        let req_builder = token.set_auth_header(req_builder);

        // debug log (if tracing enabled)
        log_request(&req_builder, &req.body);

        loop {
            let request = req_builder
                .try_clone()
                .ok_or_else(|| {
                    // try_clone with no stream body should never return None
                    NimbusError::Validation {
                        message: "reqwest::RequestBuilder internal error".into(),
                    }
                })?
                .body(req.body.clone().unwrap_or_default());

            match request.send().await {
                Ok(response) => {
                    let code = response.status();
                    match code {
                        ok if ok.is_success() => {
                            // success - get the response body.
                            // If we fail to fully read the response, don't retry. The server might
                            // believe the request succeeded, and the request may not be idempotent.
                            let body = response.bytes().await.context(HttpSnafu {
                                method: req.method.to_string(),
                                url: req.path.clone(),
                            })?;
                            log_response(&req.path, &body);

                            // deserialization failure should not be retried
                            return deserialize_json(&body);
                        }
                        StatusCode::BAD_REQUEST /* 400 */ => {
                            let message = response.text().await.unwrap_or("BadRequest".into());
                            error!(?code, ?message, ?req, "http");
                            return Err(NimbusError::Validation { message });
                        }
                        StatusCode::NOT_FOUND /* 404 */ |
                        StatusCode::GONE /* 410 */ => {
                            let message = response.text().await.unwrap_or("NotFound".into());
                            debug!(?code, ?message, ?req, "http");
                            return Err(NimbusError::NotFound {
                                // too generic here - the caller knows which
                                // object the request was about
                                obj_type: "Object".into(),
                                key: String::new(),
                            });
                        }
                        StatusCode::UNAUTHORIZED /* 401 */ => {
                            // client is not authenticated
                            let message = response.text().await.unwrap_or("Unauthorized".into());
                            error!(?code, ?message, ?req, "http");
                            return Err(NimbusError::Unauthorized);
                        }
                        StatusCode::FORBIDDEN /* 403 */ => {
                            // client is authenticated, but does not have permission
                            let message = response.text().await.unwrap_or("Forbidden".into());
                            error!(?code, ?message, ?req, "http");
                            return Err(NimbusError::Forbidden);
                        }
                        _ => {
                            let message = response.text().await.unwrap_or_default();
                            error!(?code, ?req, message, attempt, "http");
                            if attempt < self.max_retries
                                && retry_for_status(code)
                                && is_idempotent_method(&req.method)
                            {
                                log_and_backoff(attempt, code.to_string()).await;
                                attempt += 1;
                                continue;
                            }
                            return Err(NimbusError::ApiError {
                                code: code.as_u16(),
                                method: req.method.to_string(),
                                url: req.path,
                                message,
                            });
                        }
                    };
                }
                Err(source) => {
                    error!(?source, ?req, "http");
                    // Check for connection or timeout errors
                    if (source.is_connect() || source.is_timeout())
                        && is_idempotent_method(&req.method)
                        && attempt < self.max_retries
                    {
                        log_and_backoff(attempt, source.to_string()).await;
                        attempt += 1;
                        continue;
                    }
                    // Other non-recoverable errors (e.g., DNS error, invalid URL, etc.)
                    return Err(NimbusError::Http {
                        method: req.method.to_string(),
                        url: req.path,
                        source,
                    });
                }
            }
        }
    }
}

// exponential backoff before the next retry attempt
async fn log_and_backoff(attempt: u32, reason: String) {
    let wait = Duration::from_millis(RETRY_BACKOFF_BASE_MS * 2u64.pow(attempt));
    warn!(attempt, reason, "http retrying in {}ms", wait.as_millis());
    tokio::time::sleep(wait).await;
}

// dump request
// requires RUST_LOG=nimbus::http_json=trace
fn log_request(builder: &reqwest::RequestBuilder, body: &Option<Bytes>) {
    if tracing::enabled!(target: "nimbus::http_json", tracing::Level::TRACE)
        && let Some(req) = builder.try_clone().and_then(|b| b.build().ok())
    {
        let method = req.method().as_str();
        let url = req.url();
        let body = body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).to_string())
            .unwrap_or_default();
        // Log method, url (including all query parameters), and body
        // don't log headers so we don't leak the api token
        trace!(target: "nimbus::http_json", "{method} url={url} body={body}");
    }
}

// dump json response, for debugging
fn log_response(path: &str, body: &Bytes) {
    if tracing::enabled!(target: "nimbus::http_json", tracing::Level::TRACE) {
        trace!(target: "nimbus::http_json", "Response path={path} body={}",
            String::from_utf8_lossy(body)
        );
    }
}

// deserialize, reporting errors with 'serde_path_to_error', which provides
// detailed json path to the error
fn deserialize_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(err) => {
            error!("Deserialization failed at {}: {}", err.path(), err);
            Err(NimbusError::Deserialization {
                source: err.into_inner(),
            })
        }
    }
}
