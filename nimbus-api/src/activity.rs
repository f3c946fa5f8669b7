//! Activity data model.
//!
//! An activity is a server-tracked asynchronous operation (backup, restore,
//! deploy, ...). The server owns the activity; the client only ever holds a
//! read-only snapshot, refreshed by re-fetching. Once an activity reaches a
//! terminal state it never changes again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Activity type for an environment backup
pub const ACTIVITY_TYPE_BACKUP: &str = "environment.backup";

/// Activity type for a backup restore
pub const ACTIVITY_TYPE_RESTORE: &str = "environment.backup.restore";

/// Name of the restore action on a backup activity
pub const OPERATION_RESTORE: &str = "restore";

/// Lifecycle state of an activity.
///
/// Allowed transitions are `pending -> in_progress -> {complete, failure}`;
/// fast operations may skip an observable `in_progress` and go straight from
/// `pending` to a terminal state. There are no transitions out of terminal
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityState {
    Pending,
    InProgress,
    Complete,
    Failure,
}

impl ActivityState {
    /// True for `complete` and `failure`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failure)
    }
}

/// Operation-specific metadata, immutable once the operation starts.
///
/// Known keys get named fields; unknown keys are preserved in `extra` so a
/// newer server does not lose data through an older client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// Name of the backup, for backup and restore activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,

    /// Residual payload keys, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Snapshot of a server-side asynchronous operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Opaque server-assigned identifier.
    pub id: String,

    /// Activity type tag, e.g. "environment.backup".
    #[serde(rename = "type")]
    pub kind: String,

    pub state: ActivityState,

    /// Percent complete, 0-100, monotonically non-decreasing while the
    /// activity is live. Advisory only: the server commits the terminal state
    /// after the percent reaches 100, so completion must be decided from
    /// `state`, never from this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_percent: Option<u8>,

    #[serde(default)]
    pub payload: ActivityPayload,

    /// Names of actions currently invocable on this activity.
    #[serde(default)]
    pub operations: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// True if the activity reached `complete`.
    pub fn is_complete(&self) -> bool {
        self.state == ActivityState::Complete
    }

    /// True if the activity reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// True if `name` may currently be invoked on this activity.
    pub fn operation_available(&self, name: &str) -> bool {
        self.operations.iter().any(|op| op == name)
    }

    /// Backup name from the payload, if present.
    pub fn backup_name(&self) -> Option<&str> {
        self.payload.backup_name.as_deref()
    }
}

/// Returns the most recent activity by creation time.
///
/// Servers return activity listings most-recent-first, but ordering is not
/// re-checked server-side, so pick the maximum explicitly rather than taking
/// the first element.
pub fn most_recent_backup(activities: &[Activity]) -> Option<&Activity> {
    activities.iter().max_by_key(|activity| activity.created_at)
}

/// Finds a backup activity by its `backup_name` payload field.
pub fn find_backup<'a>(activities: &'a [Activity], name: &str) -> Option<&'a Activity> {
    activities
        .iter()
        .find(|activity| activity.backup_name() == Some(name))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn backup(id: &str, name: &str, secs: i64) -> Activity {
        Activity {
            id: id.to_string(),
            kind: ACTIVITY_TYPE_BACKUP.to_string(),
            state: ActivityState::Complete,
            completion_percent: Some(100),
            payload: ActivityPayload {
                backup_name: Some(name.to_string()),
                extra: serde_json::Map::new(),
            },
            operations: vec![OPERATION_RESTORE.to_string()],
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn deserialize_preserves_unknown_payload_keys() {
        let body = serde_json::json!({
            "id": "act-1",
            "type": "environment.backup",
            "state": "in_progress",
            "completion_percent": 30,
            "payload": {
                "backup_name": "2026-08-01",
                "commit_sha": "abc123",
                "region": "eu-west"
            },
            "operations": [],
            "created_at": "2026-08-01T10:00:00Z"
        });
        let activity: Activity = serde_json::from_value(body).unwrap();
        assert_eq!(activity.backup_name(), Some("2026-08-01"));
        assert_eq!(activity.state, ActivityState::InProgress);
        assert_eq!(activity.completion_percent, Some(30));
        assert_eq!(activity.payload.extra["commit_sha"], "abc123");
        assert_eq!(activity.payload.extra["region"], "eu-west");
    }

    #[test]
    fn unknown_state_is_rejected() {
        let result = serde_json::from_str::<ActivityState>("\"paused\"");
        assert!(result.is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(ActivityState::Complete.is_terminal());
        assert!(ActivityState::Failure.is_terminal());
        assert!(!ActivityState::Pending.is_terminal());
        assert!(!ActivityState::InProgress.is_terminal());
    }

    #[test]
    fn operation_available_checks_name() {
        let activity = backup("act-1", "b1", 100);
        assert!(activity.operation_available(OPERATION_RESTORE));
        assert!(!activity.operation_available("delete"));
    }

    #[test]
    fn most_recent_ignores_server_order() {
        // oldest listed first; selection must not trust the wire order
        let activities = vec![
            backup("act-1", "old", 100),
            backup("act-3", "newest", 300),
            backup("act-2", "mid", 200),
        ];
        let selected = most_recent_backup(&activities).unwrap();
        assert_eq!(selected.id, "act-3");
    }

    #[test]
    fn most_recent_of_empty_is_none() {
        assert!(most_recent_backup(&[]).is_none());
    }

    #[test]
    fn find_backup_by_name() {
        let activities = vec![backup("act-1", "2026-08-01", 100), backup("act-2", "2026-08-02", 200)];
        assert_eq!(find_backup(&activities, "2026-08-01").unwrap().id, "act-1");
        assert!(find_backup(&activities, "2024-01-01").is_none());
    }
}
