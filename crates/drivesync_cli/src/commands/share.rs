//! Share command implementations.

use super::Format;
use chrono::{DateTime, Utc};
use drivesync_core::{Config, Drive};
use drivesync_sync_server::ShareTokenService;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// A created share, without its password hash.
#[derive(Debug, Serialize)]
pub struct ShareSummary {
    /// Share token.
    pub token: String,
    /// Covered path.
    pub scope_path: String,
    /// Whether the scope is a directory.
    pub scope_is_dir: bool,
    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

fn open(root: &Path, secret: &str) -> Result<ShareTokenService, Box<dyn std::error::Error>> {
    let drive = Drive::open(root, Config::default())?;
    // The TTL only matters for issued credentials, which the CLI never issues.
    Ok(ShareTokenService::new(
        secret.as_bytes(),
        Duration::ZERO,
        drive.meta(),
    )?)
}

/// Returns `now` plus `hours`, or an error if the result is out of range.
fn expiry_after(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>, String> {
    chrono::Duration::try_hours(hours)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| format!("--expires-in-hours {hours} is out of range"))
}

/// Runs `share create`.
pub fn create(
    root: &Path,
    secret: &str,
    scope: &str,
    is_file: bool,
    password: &str,
    expires_in_hours: Option<i64>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let expires_at = expires_in_hours
        .map(|h| expiry_after(Utc::now(), h))
        .transpose()?;
    let share = open(root, secret)?.create_share(scope, !is_file, password, expires_at)?;
    let summary = ShareSummary {
        token: share.token,
        scope_path: share.scope_path,
        scope_is_dir: share.scope_is_dir,
        expires_at: share.expires_at,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        Format::Text => {
            println!("Share created");
            println!("  Token:   {}", summary.token);
            println!(
                "  Scope:   {}{}",
                summary.scope_path,
                if summary.scope_is_dir { "/" } else { "" }
            );
            match summary.expires_at {
                Some(at) => println!("  Expires: {}", at.to_rfc3339()),
                None => println!("  Expires: never"),
            }
        }
    }
    Ok(())
}

/// Runs `share revoke`.
pub fn revoke(root: &Path, secret: &str, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    if open(root, secret)?.revoke_share(token)? {
        println!("Share revoked");
        Ok(())
    } else {
        Err(format!("no share with token {token:?}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_is_offset_from_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let at = expiry_after(now, 48).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn huge_expiry_is_an_error() {
        let now = Utc::now();
        for hours in [i64::MAX, i64::MIN, 1 << 40] {
            let err = expiry_after(now, hours).unwrap_err();
            assert!(err.contains("out of range"), "{err}");
        }
    }
}
