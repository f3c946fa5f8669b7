/*
 * Nimbus rust api client
 * github.com/nimbus-cloud/nimbus-rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */
//! # Nimbus Rust API Client
//!
//! An async client for the Nimbus hosting platform API.
//!
//! ## Features
//!
//! - typed activity (asynchronous operation) model with lifecycle states
//! - activity listing, lookup, and action invocation per environment
//! - operation tracker that polls an activity to completion with progress
//!   reporting, timeout, and cancellation
//! - http middleware with retry logic and typed error mapping
//! - companion cli tool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nimbus::prelude::*;
//! # async fn example() -> Result<(), NimbusError> {
//!
//! let config = ClientConfig::default().app_name("my-app");
//! let client = NimbusClient::with_config(config)?;
//! client.set_token(SecretToken::new("api-token"));
//!
//! // List the most recent backups of an environment
//! let env = client.environment("main");
//! let backups = env.activities().kind(ACTIVITY_TYPE_BACKUP).limit(1).list().await?;
//! if let Some(backup) = most_recent_backup(&backups) {
//!     println!(
//!         "most recent backup: {} from {}",
//!         backup.backup_name().unwrap_or("(unnamed)"),
//!         backup.created_at
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API Structure
//!
//! Methods on [`NimbusClient`](client::NimbusClient) and
//! [`EnvironmentHandle`](environment::EnvironmentHandle) return request
//! builders that are configured with chained calls and executed with a
//! terminal method like `get()` or `list()`.
//!
//! Server-side asynchronous operations ("activities") are driven to
//! completion with [`tracker::wait_and_log`], which polls the activity until
//! it reaches a terminal state. See the [`tracker`] module for the polling,
//! timeout, and cancellation semantics.
//!
#![allow(clippy::missing_errors_doc)] // pedantic
#![allow(clippy::missing_const_for_fn)] //  nursery function
#![allow(clippy::must_use_candidate)] // pedantic
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::option_if_let_else)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_wraps)]

pub mod activity;
pub mod auth;
pub mod client;
pub mod config;
pub mod environment;
pub mod error;
mod http_client;
pub mod tracker;

pub use config::{NIMBUS_DEFAULT_URL, NIMBUS_TOKEN_ENV, NIMBUS_URL_ENV};

/// Result type returned by client methods
pub type Result<T, E = error::NimbusError> = core::result::Result<T, E>;

pub mod prelude {
    //! Common imports for working with the nimbus client.
    pub use crate::{
        Result,
        activity::{
            ACTIVITY_TYPE_BACKUP, ACTIVITY_TYPE_RESTORE, Activity, ActivityPayload, ActivityState,
            OPERATION_RESTORE, find_backup, most_recent_backup,
        },
        auth::SecretToken,
        client::NimbusClient,
        config::ClientConfig,
        environment::{ActivitiesRequest, EnvironmentHandle},
        error::NimbusError,
        tracker::{
            ActivitySource, ProgressReporter, RetryConfig, TrackerError, TrackerOptions,
            WaitCancel, WaitOutcome, wait_and_log,
        },
    };
}
