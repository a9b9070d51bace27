use crate::events::DomainEvent;
use anyhow::Result;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub fn mirror_event(path: &Path, ev: &DomainEvent) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let line = json!({
        "id": ev.id,
        "ts": ev.timestamp.to_rfc3339(),
        "event": ev.event_type(),
        "user": ev.user_id
    });
    writeln!(f, "{}", line)?;
    Ok(())
}
