//! Confirmation prompt for destructive actions.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// Ask a yes/no question on the terminal. Only "y" or "yes" confirms.
pub fn confirm(message: &str) -> Result<bool> {
    print!("{message} [y/N] ");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read confirmation")?;
    Ok(is_affirmative(&line))
}

fn is_affirmative(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    )
}
