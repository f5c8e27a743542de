//! Clip moderation state, reports and the audit log.
//!
//! Per-clip state is created lazily on the first report or action. Applying
//! any action closes every open report on the clip, even when the action is
//! a no-op state-wise. Every report and action is appended to a daily JSONL
//! audit file.

use std::collections::{BTreeSet, HashMap};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;
use uuid::Uuid;

use crate::error::ServiceError;

/// Clip visibility levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Owner only.
    Private,
    /// Members of the owning event.
    Event,
    /// Friends of the owner.
    Friends,
    /// Everyone.
    Public,
}

impl Visibility {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Event => "event",
            Visibility::Friends => "friends",
            Visibility::Public => "public",
        }
    }

    /// Parse a wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "private" => Some(Visibility::Private),
            "event" => Some(Visibility::Event),
            "friends" => Some(Visibility::Friends),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }
}

/// Moderation actions an admin can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    /// Hide the clip from non-admin readers.
    Hide,
    /// Restore a hidden clip.
    Unhide,
    /// Change the clip's visibility level.
    SetVisibility,
}

impl ModerationAction {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationAction::Hide => "hide",
            ModerationAction::Unhide => "unhide",
            ModerationAction::SetVisibility => "set_visibility",
        }
    }

    /// Parse a wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hide" => Some(ModerationAction::Hide),
            "unhide" => Some(ModerationAction::Unhide),
            "set_visibility" => Some(ModerationAction::SetVisibility),
            _ => None,
        }
    }
}

/// Who is asking for a clip; drives the visibility matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// Admin or host; sees everything.
    Admin,
    /// Spectator presenting a member id.
    Member,
    /// Spectator without a member id.
    Anonymous,
}

/// Public view of a clip's moderation state.
#[derive(Debug, Clone)]
pub struct ClipModerationState {
    /// Clip id.
    pub clip_id: Uuid,
    /// Hidden from non-admins.
    pub hidden: bool,
    /// Current visibility level.
    pub visibility: Visibility,
    /// Open report count.
    pub open_reports: usize,
    /// Last state change.
    pub updated_ts: OffsetDateTime,
}

/// A filed report.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    /// Report id.
    pub id: String,
    /// Reported clip.
    pub clip_id: Uuid,
    /// Filing time.
    pub ts: OffsetDateTime,
    /// Reason given by the reporter.
    pub reason: String,
    /// Open until an action resolves it.
    pub resolved_ts: Option<OffsetDateTime>,
    /// Free-form detail payload.
    pub details: Option<Value>,
    /// Reporter identity when known.
    pub reporter: Option<String>,
}

struct ClipState {
    hidden: bool,
    visibility: Visibility,
    open: BTreeSet<String>,
    updated_ts: OffsetDateTime,
}

impl ClipState {
    fn new() -> Self {
        Self {
            hidden: false,
            visibility: Visibility::Public,
            open: BTreeSet::new(),
            updated_ts: OffsetDateTime::now_utc(),
        }
    }

    fn to_public(&self, clip_id: Uuid) -> ClipModerationState {
        ClipModerationState {
            clip_id,
            hidden: self.hidden,
            visibility: self.visibility,
            open_reports: self.open.len(),
            updated_ts: self.updated_ts,
        }
    }
}

#[derive(Default)]
struct Inner {
    states: HashMap<Uuid, ClipState>,
    reports: HashMap<String, ReportRecord>,
}

/// In-memory moderation store with a JSONL audit trail.
pub struct ModerationStore {
    inner: Mutex<Inner>,
    data_dir: Option<PathBuf>,
}

impl ModerationStore {
    /// Build a store writing audit entries under `data_dir` (disabled when
    /// `None`, for tests).
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            data_dir,
        }
    }

    /// File a report against a clip.
    pub fn record_report(
        &self,
        clip_id: Uuid,
        reason: &str,
        details: Option<Value>,
        reporter: Option<String>,
    ) -> ReportRecord {
        let now = OffsetDateTime::now_utc();
        let report = ReportRecord {
            id: Uuid::new_v4().simple().to_string(),
            clip_id,
            ts: now,
            reason: reason.to_string(),
            resolved_ts: None,
            details: details.clone(),
            reporter: reporter.clone(),
        };

        let mut inner = self.inner.lock().expect("moderation store poisoned");
        let state = inner.states.entry(clip_id).or_insert_with(ClipState::new);
        state.open.insert(report.id.clone());
        state.updated_ts = now;
        inner.reports.insert(report.id.clone(), report.clone());
        drop(inner);

        self.append_audit(json!({
            "type": "report",
            "clipId": clip_id,
            "id": report.id,
            "reason": reason,
            "details": details,
            "reporter": reporter,
            "status": "open",
            "ts": rfc3339(now),
        }));
        report
    }

    /// Apply a moderation action; any transition closes all open reports.
    pub fn apply_action(
        &self,
        clip_id: Uuid,
        action: ModerationAction,
        visibility: Option<Visibility>,
        performed_by: Option<String>,
    ) -> Result<ClipModerationState, ServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.lock().expect("moderation store poisoned");
        let state = inner.states.entry(clip_id).or_insert_with(ClipState::new);

        let changed = match action {
            ModerationAction::Hide => {
                let changed = !state.hidden;
                state.hidden = true;
                changed
            }
            ModerationAction::Unhide => {
                let changed = state.hidden;
                state.hidden = false;
                changed
            }
            ModerationAction::SetVisibility => {
                let visibility = visibility.ok_or_else(|| {
                    ServiceError::InvalidInput(
                        "visibility required for set_visibility action".into(),
                    )
                })?;
                let changed = state.visibility != visibility;
                state.visibility = visibility;
                changed
            }
        };

        let closed: Vec<String> = state.open.iter().cloned().collect();
        state.open.clear();
        if changed || !closed.is_empty() {
            state.updated_ts = now;
        }
        let snapshot = state.to_public(clip_id);
        let hidden = state.hidden;
        let visibility_now = state.visibility;
        for report_id in &closed {
            if let Some(report) = inner.reports.get_mut(report_id) {
                report.resolved_ts = Some(now);
            }
        }
        drop(inner);

        if changed || !closed.is_empty() {
            self.append_audit(json!({
                "type": "action",
                "clipId": clip_id,
                "action": action.as_str(),
                "hidden": hidden,
                "visibility": visibility_now.as_str(),
                "performedBy": performed_by,
                "closedReports": closed,
                "ts": rfc3339(now),
            }));
        }
        Ok(snapshot)
    }

    /// Moderation state of one clip (default state when never touched).
    pub fn state(&self, clip_id: Uuid) -> ClipModerationState {
        let inner = self.inner.lock().expect("moderation store poisoned");
        inner
            .states
            .get(&clip_id)
            .map(|state| state.to_public(clip_id))
            .unwrap_or_else(|| ClipState::new().to_public(clip_id))
    }

    /// Whether the clip is hidden.
    pub fn is_hidden(&self, clip_id: Uuid) -> bool {
        let inner = self.inner.lock().expect("moderation store poisoned");
        inner.states.get(&clip_id).map(|state| state.hidden).unwrap_or(false)
    }

    /// Effective visibility of the clip.
    pub fn visibility(&self, clip_id: Uuid) -> Visibility {
        let inner = self.inner.lock().expect("moderation store poisoned");
        inner
            .states
            .get(&clip_id)
            .map(|state| state.visibility)
            .unwrap_or(Visibility::Public)
    }

    /// Visibility matrix: may `viewer` see this clip?
    pub fn visible_to(&self, clip_id: Uuid, viewer: Viewer) -> bool {
        if viewer == Viewer::Admin {
            return true;
        }
        let inner = self.inner.lock().expect("moderation store poisoned");
        let (hidden, visibility) = inner
            .states
            .get(&clip_id)
            .map(|state| (state.hidden, state.visibility))
            .unwrap_or((false, Visibility::Public));
        drop(inner);
        if hidden {
            return false;
        }
        match visibility {
            Visibility::Public => true,
            Visibility::Event | Visibility::Friends => viewer == Viewer::Member,
            Visibility::Private => false,
        }
    }

    /// Admin queue: clips with moderation state, open-report clips only by
    /// default, newest-updated first.
    pub fn queue(&self, status: &str) -> Vec<ClipModerationState> {
        let inner = self.inner.lock().expect("moderation store poisoned");
        let mut items: Vec<ClipModerationState> = inner
            .states
            .iter()
            .map(|(clip_id, state)| state.to_public(*clip_id))
            .filter(|state| status != "open" || state.open_reports > 0)
            .collect();
        items.sort_by(|a, b| b.updated_ts.cmp(&a.updated_ts));
        items
    }

    /// Fetch one report.
    pub fn report(&self, report_id: &str) -> Option<ReportRecord> {
        let inner = self.inner.lock().expect("moderation store poisoned");
        inner.reports.get(report_id).cloned()
    }

    fn append_audit(&self, record: Value) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let now = OffsetDateTime::now_utc();
        let name = format!(
            "{:04}-{:02}-{:02}.jsonl",
            now.year(),
            now.month() as u8,
            now.day()
        );
        let path = dir.join(name);
        let result = std::fs::create_dir_all(dir).and_then(|()| {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{record}")
        });
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "failed to append moderation audit entry");
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ModerationStore {
        ModerationStore::new(None)
    }

    #[test]
    fn hide_resolves_reports_and_blocks_non_admins() {
        let store = store();
        let clip = Uuid::new_v4();
        let report = store.record_report(clip, "offensive", None, Some("m9".into()));
        assert_eq!(store.state(clip).open_reports, 1);

        let state = store
            .apply_action(clip, ModerationAction::Hide, None, Some("admin".into()))
            .unwrap();
        assert!(state.hidden);
        assert_eq!(state.open_reports, 0);
        assert!(store.report(&report.id).unwrap().resolved_ts.is_some());

        assert!(store.visible_to(clip, Viewer::Admin));
        assert!(!store.visible_to(clip, Viewer::Member));
        assert!(!store.visible_to(clip, Viewer::Anonymous));

        let state = store
            .apply_action(clip, ModerationAction::Unhide, None, None)
            .unwrap();
        assert!(!state.hidden);
        assert!(store.visible_to(clip, Viewer::Anonymous));
    }

    #[test]
    fn noop_action_still_resolves_open_reports() {
        let store = store();
        let clip = Uuid::new_v4();
        store.record_report(clip, "spam", None, None);
        // Clip is not hidden; unhide changes nothing state-wise.
        let state = store
            .apply_action(clip, ModerationAction::Unhide, None, None)
            .unwrap();
        assert!(!state.hidden);
        assert_eq!(state.open_reports, 0);
    }

    #[test]
    fn visibility_matrix() {
        let store = store();
        let clip = Uuid::new_v4();

        // Default public: everyone sees it.
        assert!(store.visible_to(clip, Viewer::Anonymous));

        store
            .apply_action(
                clip,
                ModerationAction::SetVisibility,
                Some(Visibility::Event),
                None,
            )
            .unwrap();
        assert!(store.visible_to(clip, Viewer::Admin));
        assert!(store.visible_to(clip, Viewer::Member));
        assert!(!store.visible_to(clip, Viewer::Anonymous));

        store
            .apply_action(
                clip,
                ModerationAction::SetVisibility,
                Some(Visibility::Private),
                None,
            )
            .unwrap();
        assert!(store.visible_to(clip, Viewer::Admin));
        assert!(!store.visible_to(clip, Viewer::Member));
    }

    #[test]
    fn set_visibility_requires_a_value() {
        let store = store();
        let err = store
            .apply_action(Uuid::new_v4(), ModerationAction::SetVisibility, None, None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn queue_filters_open_and_orders_newest_first() {
        let store = store();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.record_report(first, "spam", None, None);
        store.record_report(second, "offensive", None, None);

        let queue = store.queue("open");
        assert_eq!(queue.len(), 2);
        assert!(queue[0].updated_ts >= queue[1].updated_ts);

        store.apply_action(first, ModerationAction::Hide, None, None).unwrap();
        let open_only = store.queue("open");
        assert_eq!(open_only.len(), 1);
        assert_eq!(open_only[0].clip_id, second);

        // "all" keeps resolved clips in the queue.
        assert_eq!(store.queue("all").len(), 2);
    }

    #[test]
    fn audit_log_appends_daily_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModerationStore::new(Some(dir.path().to_path_buf()));
        let clip = Uuid::new_v4();
        store.record_report(clip, "spam", None, None);
        store.apply_action(clip, ModerationAction::Hide, None, None).unwrap();

        let entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .flat_map(|path| {
                std::fs::read_to_string(path)
                    .unwrap()
                    .lines()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(entries.len(), 2);
        let report: Value = serde_json::from_str(&entries[0]).unwrap();
        assert_eq!(report["type"], "report");
        let action: Value = serde_json::from_str(&entries[1]).unwrap();
        assert_eq!(action["action"], "hide");
    }
}
