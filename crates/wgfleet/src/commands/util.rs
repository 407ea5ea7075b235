//! Shared helpers for command handlers.

use wgfleet_core::{CachePolicy, ResourceHandle};

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// `--fresh` bypasses the read cache.
pub fn cache_policy(fresh: bool) -> CachePolicy {
    if fresh {
        CachePolicy::Bypass
    } else {
        CachePolicy::Prefer
    }
}

/// One-line acknowledgement on stderr, so stdout stays parseable.
pub fn report(action: &str, handle: Option<&ResourceHandle>, quiet: bool) {
    if quiet {
        return;
    }
    match handle {
        Some(handle) => eprintln!("✓ {action} ({handle})"),
        None => eprintln!("✓ {action}"),
    }
}

/// `-` for absent optional values in tables.
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_owned()
}
