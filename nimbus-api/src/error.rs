//! Errors returned by `NimbusClient`
//!
use snafu::prelude::*;

/// Errors returned by the nimbus crate
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NimbusError {
    // Http connection or timeout error
    #[snafu(display("HTTP error {method} url:{url}"))]
    Http {
        method: String,
        url: String,
        source: reqwest::Error,
    },

    /// Nimbus server responded with an error.
    /// This usually means the request was invalid, or there was an internal server error.
    #[snafu(display("Api Server reported error ({code}) {method} {url}: {message}"))]
    ApiError {
        code: u16,
        method: String,
        url: String,
        message: String,
    },

    /// Encountered server error on "retryable" request, but all retry attempts failed.
    #[snafu(display("server api request: failed {n} times"))]
    TooManyRetries { n: u32 },

    /// Authorization error
    #[snafu(display("Authentication failed: {message}"))]
    Auth { message: String },

    /// Deserialization error. This means we didn't deserialize a server response correctly.
    /// If you see this error, please report it as a bug.
    #[snafu(display("Deserialization: {source}"))]
    Deserialization { source: serde_json::Error },

    /// Serialization error. unlikely to occur. If you see this error, please report it as a bug.
    #[snafu(display("Serialization: {source}"))]
    Serialization { source: serde_json::Error },

    /// Expected item was not found. Returned for any object get by id,
    /// or for a named backup that does not exist.
    #[snafu(display("{obj_type} {key} not found"))]
    NotFound { obj_type: String, key: String },

    /// Client is not authenticated.
    #[snafu(display("Client is not authenticated. Provide an API token."))]
    Unauthorized,

    /// Client is authenticated, but user does not have proper authorization
    #[snafu(display("Permission denied: User does not have permission to access the object(s)"))]
    Forbidden,

    /// Validation error: an internal parameter validation check failed.
    #[snafu(display("Validation error: {message}"))]
    Validation { message: String },

    /// An action was requested on an activity whose current state does not permit it.
    /// The message distinguishes "not complete yet" from "action not supported".
    #[snafu(display("{message}"))]
    Precondition { message: String },
}
