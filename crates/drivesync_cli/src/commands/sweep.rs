//! Sweep command implementation.

use super::Format;
use drivesync_core::{Config, Drive};
use std::path::Path;
use std::time::Duration;

/// Runs `sweep`: removes upload sessions idle for longer than the given age.
pub fn run(
    root: &Path,
    max_age_hours: Option<u64>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let drive = Drive::open(root, Config::default())?;
    let max_age = max_age_hours
        .map(|h| Duration::from_secs(h * 60 * 60))
        .unwrap_or(drive.config().session_max_age);
    let report = drive.sweep_stale_uploads(max_age)?;

    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({
                "sessions": report.sessions,
                "spools_removed": report.spools_removed,
                "failures": report.failures,
            })
        ),
        Format::Text => {
            println!("Sessions removed: {}", report.sessions);
            println!("Spools removed:   {}", report.spools_removed);
            if report.failures > 0 {
                println!("Failures:         {}", report.failures);
            }
        }
    }
    Ok(())
}
