//! Changes command implementation.

use super::Format;
use drivesync_core::{Change, Config, Drive};
use std::path::Path;

/// Runs `changes`: prints one page of the change log.
pub fn run(
    root: &Path,
    since: i64,
    limit: Option<i64>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let drive = Drive::open(root, Config::default())?;
    let page = drive.changes_since(since, limit)?;

    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "changes": page.changes,
                "next_since": page.next_cursor,
            }))?
        ),
        Format::Text => {
            for change in &page.changes {
                println!("{}", describe(change));
            }
            println!("next since: {}", page.next_cursor);
        }
    }
    Ok(())
}

fn describe(change: &Change) -> String {
    let mut line = format!(
        "{:>8}  {:<6}  rev {:<4}  {}",
        change.change_id,
        change.action.as_str(),
        change.rev,
        change.rel_path
    );
    if let Some(size) = change.size.or(change.deleted_size) {
        line.push_str(&format!("  ({size} bytes)"));
    }
    if let Some(device) = &change.device_id {
        line.push_str(&format!("  [{device}]"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drivesync_core::ChangeAction;

    #[test]
    fn describe_change() {
        let change = Change {
            change_id: 7,
            rel_path: "docs/a.txt".into(),
            action: ChangeAction::Delete,
            is_dir: false,
            rev: 3,
            size: None,
            mtime: None,
            content_hash: None,
            deleted_size: Some(12),
            deleted_hash: Some(1),
            device_id: Some("phone".into()),
            created_at: Utc::now(),
        };
        let line = describe(&change);
        assert!(line.contains("delete"));
        assert!(line.contains("rev 3"));
        assert!(line.contains("docs/a.txt"));
        assert!(line.contains("(12 bytes)"));
        assert!(line.ends_with("[phone]"));
    }
}
