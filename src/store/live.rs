//! Live stream supervisor.
//!
//! Per-event stream state with a single-start invariant and idempotent stop.
//! Viewer registration happens as a side effect of token verification and is
//! idempotent per viewer id. Every transition is appended to `streams.jsonl`
//! when a data directory is configured.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use dashmap::DashMap;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;
use uuid::Uuid;

use crate::config::LiveConfig;
use crate::error::ServiceError;

/// Snapshot of one event's live state.
#[derive(Debug, Clone)]
pub struct LiveStatus {
    /// Whether a stream is running.
    pub running: bool,
    /// Manifest path; stripped for unverified callers at the route layer.
    pub hls_path: Option<String>,
    /// Stream start time.
    pub started_at: Option<OffsetDateTime>,
    /// Ingest source label.
    pub source: Option<String>,
    /// Distinct registered viewers.
    pub viewers: usize,
}

#[derive(Default)]
struct StreamState {
    running: bool,
    hls_path: Option<String>,
    started_at: Option<OffsetDateTime>,
    source: Option<String>,
    viewers: HashSet<String>,
}

impl StreamState {
    fn snapshot(&self) -> LiveStatus {
        LiveStatus {
            running: self.running,
            hls_path: self.hls_path.clone(),
            started_at: self.started_at,
            source: self.source.clone(),
            viewers: self.viewers.len(),
        }
    }
}

/// Supervisor of all event streams.
pub struct LiveSupervisor {
    streams: DashMap<Uuid, StreamState>,
    mock_prefix: Option<String>,
    ingest_url: Option<String>,
    data_dir: Option<PathBuf>,
}

impl LiveSupervisor {
    /// Build a supervisor from the live configuration.
    pub fn new(config: &LiveConfig) -> Self {
        Self {
            streams: DashMap::new(),
            mock_prefix: config.mock_prefix.clone(),
            ingest_url: config.ingest_url.clone(),
            data_dir: config.data_dir.clone(),
        }
    }

    /// Start a stream; fails when one is already running.
    pub fn start(&self, event_id: Uuid, source: &str) -> Result<LiveStatus, ServiceError> {
        let hls_path = if source == "mock" {
            let prefix = self
                .mock_prefix
                .as_deref()
                .unwrap_or("/live-mock")
                .trim_end_matches('/')
                .to_string();
            format!("{prefix}/{event_id}/index.m3u8")
        } else {
            if self.ingest_url.is_none() {
                return Err(ServiceError::Disabled(
                    "live stream ingest not configured".into(),
                ));
            }
            format!("/hls/{event_id}/index.m3u8")
        };

        let mut state = self.streams.entry(event_id).or_default();
        if state.running {
            return Err(ServiceError::Conflict("live stream already running".into()));
        }
        let now = OffsetDateTime::now_utc();
        state.running = true;
        state.hls_path = Some(hls_path.clone());
        state.started_at = Some(now);
        state.source = Some(source.to_string());
        state.viewers.clear();
        let snapshot = state.snapshot();
        drop(state);

        self.append_log(json!({
            "type": "start",
            "eventId": event_id,
            "source": source,
            "hlsPath": hls_path,
            "ts": rfc3339(now),
        }));
        Ok(snapshot)
    }

    /// Stop a stream; idempotent, clears viewers.
    pub fn stop(&self, event_id: Uuid) -> bool {
        let mut state = self.streams.entry(event_id).or_default();
        if !state.running {
            return false;
        }
        state.running = false;
        state.hls_path = None;
        state.started_at = None;
        state.source = None;
        state.viewers.clear();
        drop(state);

        self.append_log(json!({
            "type": "stop",
            "eventId": event_id,
            "ts": rfc3339(OffsetDateTime::now_utc()),
        }));
        true
    }

    /// Current state of one event's stream.
    pub fn status(&self, event_id: Uuid) -> LiveStatus {
        self.streams
            .get(&event_id)
            .map(|state| state.snapshot())
            .unwrap_or_else(|| StreamState::default().snapshot())
    }

    /// Register a verified viewer; idempotent per viewer id.
    pub fn register_viewer(&self, event_id: Uuid, viewer_id: &str) -> bool {
        let mut state = self.streams.entry(event_id).or_default();
        if !state.running {
            return false;
        }
        let added = state.viewers.insert(viewer_id.to_string());
        drop(state);
        if added {
            self.append_log(json!({
                "type": "viewer",
                "eventId": event_id,
                "viewerId": viewer_id,
                "ts": rfc3339(OffsetDateTime::now_utc()),
            }));
        }
        added
    }

    /// Running streams newest first, for the home feed.
    pub fn list_running(&self) -> Vec<(Uuid, LiveStatus)> {
        let mut running: Vec<(Uuid, LiveStatus)> = self
            .streams
            .iter()
            .filter(|entry| entry.value().running)
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect();
        running.sort_by(|a, b| b.1.started_at.cmp(&a.1.started_at));
        running
    }

    fn append_log(&self, record: Value) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let path = dir.join("streams.jsonl");
        let result = std::fs::create_dir_all(dir).and_then(|()| {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{record}")
        });
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "failed to append live stream log entry");
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> LiveSupervisor {
        LiveSupervisor::new(&LiveConfig {
            sign_key: None,
            mock_prefix: Some("/live-mock".into()),
            ingest_url: None,
            data_dir: None,
        })
    }

    #[test]
    fn single_start_and_idempotent_stop() {
        let live = supervisor();
        let event = Uuid::new_v4();

        let started = live.start(event, "mock").unwrap();
        assert!(started.running);
        assert_eq!(
            started.hls_path.as_deref(),
            Some(format!("/live-mock/{event}/index.m3u8").as_str())
        );

        let err = live.start(event, "mock").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        assert!(live.stop(event));
        assert!(!live.stop(event));
        let status = live.status(event);
        assert!(!status.running);
        assert!(status.hls_path.is_none());
        assert_eq!(status.viewers, 0);
    }

    #[test]
    fn non_mock_source_requires_ingest() {
        let live = supervisor();
        let err = live.start(Uuid::new_v4(), "rtmp").unwrap_err();
        assert!(matches!(err, ServiceError::Disabled(_)));
    }

    #[test]
    fn viewer_registration_is_idempotent_and_resets_on_stop() {
        let live = supervisor();
        let event = Uuid::new_v4();
        live.start(event, "mock").unwrap();

        assert!(live.register_viewer(event, "v1"));
        assert!(!live.register_viewer(event, "v1"));
        assert!(live.register_viewer(event, "v2"));
        assert_eq!(live.status(event).viewers, 2);

        live.stop(event);
        assert!(!live.register_viewer(event, "v3"));
        assert_eq!(live.status(event).viewers, 0);
    }

    #[test]
    fn list_running_orders_newest_first() {
        let live = supervisor();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        live.start(first, "mock").unwrap();
        live.start(second, "mock").unwrap();
        live.stop(first);

        let running = live.list_running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].0, second);
    }

    #[test]
    fn transitions_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let live = LiveSupervisor::new(&LiveConfig {
            sign_key: None,
            mock_prefix: Some("/live-mock".into()),
            ingest_url: None,
            data_dir: Some(dir.path().to_path_buf()),
        });
        let event = Uuid::new_v4();
        live.start(event, "mock").unwrap();
        live.register_viewer(event, "v1");
        live.stop(event);

        let log = std::fs::read_to_string(dir.path().join("streams.jsonl")).unwrap();
        let types: Vec<String> = log
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, ["start", "viewer", "stop"]);
    }
}
