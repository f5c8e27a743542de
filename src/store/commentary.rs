//! Commentary queue keyed by clip.

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// State of one commentary request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentaryStatus {
    /// Request accepted.
    Queued,
    /// Generation in flight.
    Running,
    /// Commentary persisted on the clip.
    Ready,
    /// Generation failed.
    Failed,
    /// Rejected by the tournament-safety interlock.
    BlockedSafe,
}

impl CommentaryStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            CommentaryStatus::Queued => "queued",
            CommentaryStatus::Running => "running",
            CommentaryStatus::Ready => "ready",
            CommentaryStatus::Failed => "failed",
            CommentaryStatus::BlockedSafe => "blocked_safe",
        }
    }

    /// Parse a wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(CommentaryStatus::Queued),
            "running" => Some(CommentaryStatus::Running),
            "ready" => Some(CommentaryStatus::Ready),
            "failed" => Some(CommentaryStatus::Failed),
            "blocked_safe" => Some(CommentaryStatus::BlockedSafe),
            _ => None,
        }
    }
}

/// One queue entry.
#[derive(Debug, Clone)]
pub struct CommentaryRecord {
    /// Clip the commentary is for.
    pub clip_id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Current state.
    pub status: CommentaryStatus,
    /// Generated title, once ready.
    pub title: Option<String>,
    /// Generated summary, once ready.
    pub summary: Option<String>,
    /// TTS audio URL when synthesised.
    pub tts_url: Option<String>,
    /// Strokes-gained delta resolved from the clip.
    pub sg_delta: Option<f64>,
    /// Last transition time.
    pub updated_ts: OffsetDateTime,
}

/// Fields updated alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct CommentaryUpdate {
    /// Generated title.
    pub title: Option<String>,
    /// Generated summary.
    pub summary: Option<String>,
    /// TTS URL.
    pub tts_url: Option<String>,
    /// Resolved strokes-gained delta.
    pub sg_delta: Option<f64>,
}

/// In-memory queue of commentary requests, one entry per clip.
#[derive(Default)]
pub struct CommentaryQueue {
    entries: DashMap<Uuid, CommentaryRecord>,
}

impl CommentaryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or transition the entry for a clip.
    pub fn upsert(
        &self,
        clip_id: Uuid,
        event_id: Uuid,
        status: CommentaryStatus,
        update: CommentaryUpdate,
    ) -> CommentaryRecord {
        let record = CommentaryRecord {
            clip_id,
            event_id,
            status,
            title: update.title,
            summary: update.summary,
            tts_url: update.tts_url,
            sg_delta: update
                .sg_delta
                .or_else(|| self.entries.get(&clip_id).and_then(|entry| entry.sg_delta)),
            updated_ts: OffsetDateTime::now_utc(),
        };
        self.entries.insert(clip_id, record.clone());
        record
    }

    /// Fetch the entry for one clip.
    pub fn get(&self, clip_id: Uuid) -> Option<CommentaryRecord> {
        self.entries.get(&clip_id).map(|entry| entry.clone())
    }

    /// Entries for an event, optionally filtered by status, newest first.
    pub fn list_for_event(
        &self,
        event_id: Uuid,
        status: Option<CommentaryStatus>,
    ) -> Vec<CommentaryRecord> {
        let mut entries: Vec<CommentaryRecord> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.event_id == event_id
                    && status.is_none_or(|status| entry.status == status)
            })
            .map(|entry| entry.clone())
            .collect();
        entries.sort_by(|a, b| b.updated_ts.cmp(&a.updated_ts));
        entries
    }
}
