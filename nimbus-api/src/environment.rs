//! Environment-scoped API operations.
//!
//! An [`EnvironmentHandle`] scopes activity listing, lookup, and action
//! invocation to one environment. Handles are cheap to clone and carry no
//! mutable state of their own.

use std::sync::Arc;

use tracing::debug;

use crate::{
    Result,
    activity::{Activity, OPERATION_RESTORE},
    error::NimbusError,
    http_client::HttpClient,
    tracker::ActivitySource,
};

/// Scoped view of one environment.
#[derive(Debug, Clone)]
pub struct EnvironmentHandle {
    pub(crate) http: Arc<HttpClient>,
    pub(crate) id: String,
}

impl EnvironmentHandle {
    /// The environment id this handle is scoped to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// List activities for this environment.
    /// Results are most-recent-first regardless of server ordering.
    pub fn activities(&self) -> ActivitiesRequest {
        ActivitiesRequest {
            http: self.http.clone(),
            environment_id: self.id.clone(),
            kind: None,
            limit: None,
        }
    }

    /// Fetch a single activity by id.
    pub fn activity(&self, activity_id: impl Into<String>) -> ActivityRequest {
        ActivityRequest {
            http: self.http.clone(),
            environment_id: self.id.clone(),
            activity_id: activity_id.into(),
        }
    }

    /// Invoke a named action on an activity, returning the new activity that
    /// tracks the action.
    ///
    /// Fails with [`NimbusError::Precondition`] before any network call when
    /// the action is not in the activity's available operations.
    pub async fn invoke(&self, activity: &Activity, action: &str) -> Result<Activity> {
        if !activity.operation_available(action) {
            let message = if activity.is_complete() {
                format!("activity {} does not support '{action}'", activity.id)
            } else {
                format!(
                    "activity {} is not complete, so '{action}' is not available",
                    activity.id
                )
            };
            return Err(NimbusError::Precondition { message });
        }
        debug!(environment = %self.id, activity = %activity.id, action, "invoke");
        let path = format!(
            "/environments/{}/activities/{}/{action}",
            self.id, activity.id
        );
        self.http.post_request(&path, &serde_json::json!({})).await
    }

    /// Restore the backup recorded by `activity`.
    pub async fn restore(&self, activity: &Activity) -> Result<Activity> {
        self.invoke(activity, OPERATION_RESTORE).await
    }
}

impl ActivitySource for EnvironmentHandle {
    async fn fetch(&self, id: &str) -> Result<Activity> {
        self.activity(id).get().await
    }
}

/// Builder for activity listings.
#[derive(Debug)]
pub struct ActivitiesRequest {
    http: Arc<HttpClient>,
    environment_id: String,
    kind: Option<String>,
    limit: Option<usize>,
}

impl ActivitiesRequest {
    /// Restrict results to one activity type (e.g. "environment.backup").
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Limit the number of results. Unset means no limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fetch the listing, sorted most-recent-first.
    pub async fn list(self) -> Result<Vec<Activity>> {
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(kind) = &self.kind {
            query.push(("type".to_string(), kind.clone()));
        }
        if let Some(limit) = self.limit {
            query.push(("count".to_string(), limit.to_string()));
        }
        let path = format!("/environments/{}/activities", self.environment_id);
        let mut items: Vec<Activity> = self.http.get_request(&path, query).await?;
        // servers send most-recent-first; re-sort instead of trusting it
        items.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(items)
    }
}

/// Request for a single activity.
#[derive(Debug)]
pub struct ActivityRequest {
    http: Arc<HttpClient>,
    environment_id: String,
    activity_id: String,
}

impl ActivityRequest {
    /// Fetch the latest snapshot of the activity.
    pub async fn get(self) -> Result<Activity> {
        let path = format!(
            "/environments/{}/activities/{}",
            self.environment_id, self.activity_id
        );
        self.http
            .get_request(&path, Vec::new())
            .await
            .map_err(|err| match err {
                NimbusError::NotFound { .. } => NimbusError::NotFound {
                    obj_type: "Activity".into(),
                    key: self.activity_id.clone(),
                },
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::activity::{ACTIVITY_TYPE_BACKUP, ActivityPayload, ActivityState};

    fn incomplete_backup() -> Activity {
        Activity {
            id: "act-1".to_string(),
            kind: ACTIVITY_TYPE_BACKUP.to_string(),
            state: ActivityState::InProgress,
            completion_percent: Some(40),
            payload: ActivityPayload::default(),
            operations: Vec::new(),
            created_at: Utc.timestamp_opt(100, 0).unwrap(),
        }
    }

    fn handle() -> EnvironmentHandle {
        let http = HttpClient::new(
            reqwest::ClientBuilder::new(),
            "http://127.0.0.1:1".to_string(),
            0,
        )
        .unwrap();
        EnvironmentHandle {
            http: Arc::new(http),
            id: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn invoke_rejects_missing_operation_before_any_network_call() {
        // base_url points nowhere; a network attempt would fail differently
        let env = handle();
        let activity = incomplete_backup();
        let err = env.restore(&activity).await.unwrap_err();
        match err {
            NimbusError::Precondition { message } => {
                assert!(message.contains("not complete"), "message: {message}");
            }
            other => panic!("expected Precondition, got {other}"),
        }
    }

    #[tokio::test]
    async fn precondition_message_distinguishes_complete_but_unsupported() {
        let env = handle();
        let mut activity = incomplete_backup();
        activity.state = ActivityState::Complete;
        activity.completion_percent = Some(100);
        let err = env.invoke(&activity, "restore").await.unwrap_err();
        match err {
            NimbusError::Precondition { message } => {
                assert!(message.contains("does not support"), "message: {message}");
            }
            other => panic!("expected Precondition, got {other}"),
        }
    }
}
