use crate::error::{Error, Result};
use crate::events::DomainEvent;
use crate::logging::ndjson;
use crate::storage::KeyValueStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const EVENTS_KEY: &str = "learnio_events";

/// Append-only log of domain events, the single source of truth for derived
/// read models. Single writer: callers serialize concurrent appends.
pub struct EventLog {
    kv: Arc<dyn KeyValueStore>,
    events: Vec<DomainEvent>,
    mirror: Option<PathBuf>,
}

impl EventLog {
    /// Opens the log and hydrates it from `kv`.
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut log = Self {
            kv,
            events: Vec::new(),
            mirror: None,
        };
        log.hydrate()?;
        Ok(log)
    }

    /// Also writes each appended event as an NDJSON line to `path`.
    pub fn with_mirror(mut self, path: Option<PathBuf>) -> Self {
        self.mirror = path;
        self
    }

    /// Replaces in-memory state with the persisted log.
    pub fn hydrate(&mut self) -> Result<()> {
        self.events = match self.kv.get(EVENTS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::validation(format!("persisted event log is malformed: {e}"))
            })?,
            None => Vec::new(),
        };
        debug!(count = self.events.len(), "hydrated event log");
        Ok(())
    }

    /// Appends events at the end of the log and persists the full log.
    ///
    /// The persisted copy is written first; in-memory state only changes once
    /// the write succeeds. Mirroring runs after the commit, so an
    /// `Error::Mirror` leaves the events in the log.
    pub fn append(&mut self, events: impl IntoIterator<Item = DomainEvent>) -> Result<()> {
        let incoming: Vec<DomainEvent> = events.into_iter().collect();
        if incoming.is_empty() {
            return Ok(());
        }
        let mut next = Vec::with_capacity(self.events.len() + incoming.len());
        next.extend(self.events.iter().cloned());
        next.extend(incoming.iter().cloned());
        self.kv.set(EVENTS_KEY, &serde_json::to_string(&next)?)?;
        self.events = next;

        for ev in &incoming {
            debug!(id = %ev.id, event = ev.event_type(), user = %ev.user_id, "appended event");
            if let Some(path) = self.mirror.as_deref() {
                ndjson::mirror_event(path, ev).map_err(|err| Error::Mirror {
                    path: path.to_path_buf(),
                    message: format!("{err:#}"),
                })?;
            }
        }
        Ok(())
    }

    /// All events in insertion order.
    pub fn list(&self) -> &[DomainEvent] {
        &self.events
    }

    pub fn list_filtered(&self, filter: impl Fn(&DomainEvent) -> bool) -> Vec<DomainEvent> {
        self.events.iter().filter(|e| filter(e)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clears the in-memory log and the persisted copy. Test isolation only.
    pub fn reset(&mut self) -> Result<()> {
        self.kv.remove(EVENTS_KEY)?;
        self.events.clear();
        Ok(())
    }
}
