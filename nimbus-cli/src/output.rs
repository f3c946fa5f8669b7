//! Progress output for long-running operations.

use nimbus::tracker::ProgressReporter;

/// Prints tracker progress to stdout; `--quiet` suppresses it.
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, text: &str) {
        if !self.quiet {
            println!("{text}");
        }
    }
}
