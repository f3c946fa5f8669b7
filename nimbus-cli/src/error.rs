//! Exit status mapping for the cli.
//!
//! Every failure exits with code 1 and a single human-readable line on
//! stderr. Outcomes that were already reported to the user (a declined
//! confirmation, a restore whose failure message was just printed) carry a
//! `SilentExit` so main doesn't print a second line.

use std::fmt;

/// Terminates the command with `code` without further output.
#[derive(Debug)]
pub struct SilentExit {
    pub code: i32,
}

impl fmt::Display for SilentExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit {}", self.code)
    }
}

impl std::error::Error for SilentExit {}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SilentExit>().map_or(1, |silent| silent.code)
}

pub fn should_report(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SilentExit>().is_none()
}
