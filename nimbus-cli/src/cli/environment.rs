//! Environment command handlers: backup restore and activity listing.

use std::time::Duration;

use anyhow::{Result, bail};
use nimbus::prelude::*;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    cli::{AppContext, DATE_FORMAT, EnvironmentArgs, EnvironmentCommands},
    error::SilentExit,
    output::ConsoleReporter,
    prompt,
};

pub async fn handle(ctx: &AppContext, args: EnvironmentArgs) -> Result<()> {
    match args.command {
        EnvironmentCommands::Restore {
            backup,
            no_wait,
            timeout,
            poll_interval,
            yes,
        } => {
            restore(
                ctx,
                backup,
                RestoreFlags {
                    no_wait,
                    timeout,
                    poll_interval,
                    yes,
                },
            )
            .await
        }
        EnvironmentCommands::Activities { kind, limit } => activities(ctx, kind, limit).await,
    }
}

async fn activities(ctx: &AppContext, kind: Option<String>, limit: usize) -> Result<()> {
    let env = ctx.client.environment(&ctx.environment_id);
    let mut request = env.activities().limit(limit);
    if let Some(kind) = kind {
        request = request.kind(kind);
    }
    let items = request.list().await?;
    if items.is_empty() {
        println!("No activities found");
        return Ok(());
    }
    for activity in &items {
        println!(
            "{}  {:<12}  {:>4}  {}",
            activity.created_at.format(DATE_FORMAT),
            activity.state,
            activity
                .completion_percent
                .map_or_else(String::new, |percent| format!("{percent}%")),
            activity.kind,
        );
    }
    Ok(())
}

struct RestoreFlags {
    no_wait: bool,
    timeout: Option<u64>,
    poll_interval: u64,
    yes: bool,
}

async fn restore(ctx: &AppContext, backup: Option<String>, flags: RestoreFlags) -> Result<()> {
    let env = ctx.client.environment(&ctx.environment_id);

    let selected = match backup {
        Some(name) => {
            // Find the specified backup.
            let backups = env.activities().kind(ACTIVITY_TYPE_BACKUP).list().await?;
            match find_backup(&backups, &name) {
                Some(activity) => activity.clone(),
                None => bail!("Backup not found: {name}"),
            }
        }
        None => {
            // Find the most recent backup.
            println!(
                "Finding the most recent backup for the environment {}",
                ctx.environment_id
            );
            let backups = env
                .activities()
                .kind(ACTIVITY_TYPE_BACKUP)
                .limit(1)
                .list()
                .await?;
            match most_recent_backup(&backups) {
                Some(activity) => activity.clone(),
                None => bail!("No backups found"),
            }
        }
    };
    debug!(activity = %selected.id, state = %selected.state, "selected backup");

    if let Some(reason) = not_restorable(&selected) {
        bail!("{reason}");
    }

    let name = selected
        .backup_name()
        .unwrap_or(selected.id.as_str())
        .to_string();
    let date = selected.created_at.format(DATE_FORMAT);
    if !flags.yes
        && !prompt::confirm(&format!(
            "Are you sure you want to restore the backup {name} from {date}?"
        ))?
    {
        // declined confirmation is a normal early exit, not a failure to log
        return Err(SilentExit { code: 1 }.into());
    }

    println!("Restoring backup {name}");
    let operation = env.restore(&selected).await?;

    let mut options = TrackerOptions::default()
        .poll_interval(Duration::from_secs(flags.poll_interval))
        .no_wait(flags.no_wait);
    if let Some(secs) = flags.timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    // Ctrl-C cancels the wait at the next poll boundary
    let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(WaitCancel::Requested);
        }
    });

    let reporter = ConsoleReporter::new(ctx.quiet);
    let outcome = wait_and_log(
        &operation,
        &env,
        &reporter,
        "The backup was successfully restored",
        "Restoring failed",
        &options,
        Some(&mut cancel_rx),
    )
    .await?;

    if outcome == WaitOutcome::Failed {
        // the failure message was already reported
        return Err(SilentExit { code: 1 }.into());
    }
    Ok(())
}

/// Why the backup can't be restored, if it can't. Distinguishes a backup
/// that hasn't finished from one that finished but doesn't permit restore.
fn not_restorable(activity: &Activity) -> Option<&'static str> {
    if activity.operation_available(OPERATION_RESTORE) {
        return None;
    }
    if activity.is_complete() {
        Some("The backup cannot be restored")
    } else {
        Some("The backup is not complete, so it cannot be restored")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use nimbus::activity::{ActivityPayload, ActivityState};

    use super::*;

    fn backup(state: ActivityState, operations: &[&str]) -> Activity {
        Activity {
            id: "act-1".to_string(),
            kind: ACTIVITY_TYPE_BACKUP.to_string(),
            state,
            completion_percent: None,
            payload: ActivityPayload {
                backup_name: Some("2026-08-01".to_string()),
                extra: serde_json::Map::new(),
            },
            operations: operations.iter().map(ToString::to_string).collect(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn restorable_backup_passes() {
        let activity = backup(ActivityState::Complete, &[OPERATION_RESTORE]);
        assert_eq!(not_restorable(&activity), None);
    }

    #[test]
    fn incomplete_backup_gets_specific_message() {
        let activity = backup(ActivityState::InProgress, &[]);
        assert_eq!(
            not_restorable(&activity),
            Some("The backup is not complete, so it cannot be restored")
        );
    }

    #[test]
    fn complete_but_unrestorable_backup_gets_generic_message() {
        let activity = backup(ActivityState::Complete, &[]);
        assert_eq!(not_restorable(&activity), Some("The backup cannot be restored"));
    }
}
