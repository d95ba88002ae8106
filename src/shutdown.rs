// Ctrl+C handling.
// The first Ctrl+C raises a shared flag so the running migration stops at its
// next poll and a batch skips the VMs it has not started. A second one exits.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status used when the process is interrupted twice.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Installs the process-wide Ctrl+C handler and returns the flag it raises.
pub fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        if on_interrupt(&flag) {
            eprintln!("Ctrl+C detected again, exiting.");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        eprintln!(
            "Ctrl+C detected, stopping after the current step. Press Ctrl+C again to exit now."
        );
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(cancel)
}

/// Raises `flag`; returns true if it was already raised.
fn on_interrupt(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}
