//! Clip records and their upload→transcode→reactions lifecycle.
//!
//! The repository is an abstract capability set so routes and workers do not
//! care whether clips live in memory or behind a database. Reactions keep a
//! per-member last entry for rate limiting, a sliding recent window and
//! per-emoji totals; the triple is updated atomically per clip.

use std::collections::HashMap;

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::ClipsConfig;

/// Clip processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipStatus {
    /// Placeholder created, upload pending.
    Queued,
    /// Upload complete, transcode in flight.
    Processing,
    /// Playable.
    Ready,
    /// Transcode failed; terminal by default.
    Failed,
}

impl ClipStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            ClipStatus::Queued => "queued",
            ClipStatus::Processing => "processing",
            ClipStatus::Ready => "ready",
            ClipStatus::Failed => "failed",
        }
    }
}

/// One member's last reaction, or one entry of the recent window.
#[derive(Debug, Clone)]
pub struct ReactionEntry {
    /// Emoji reacted with.
    pub emoji: String,
    /// When it landed.
    pub at: OffsetDateTime,
}

/// Reaction sub-state of a clip.
#[derive(Debug, Clone, Default)]
pub struct Reactions {
    /// Total count per emoji.
    pub counts: HashMap<String, u64>,
    /// Last reaction per member, last-wins.
    pub users: HashMap<String, ReactionEntry>,
    /// Entries inside the sliding recent window; trimmed on read and write.
    pub recent: Vec<ReactionEntry>,
}

impl Reactions {
    /// Reactions inside the window ending at `now`.
    pub fn recent_count(&self, now: OffsetDateTime, window_secs: u64) -> usize {
        self.recent
            .iter()
            .filter(|entry| (now - entry.at).whole_seconds() <= window_secs as i64)
            .count()
    }

    /// Total reactions across all emoji.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// A stored clip.
#[derive(Debug, Clone)]
pub struct ClipRecord {
    /// Clip id.
    pub id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Player who captured the shot.
    pub player_id: Uuid,
    /// Linked round, when known.
    pub round_id: Option<Uuid>,
    /// Hole number, 1..=18.
    pub hole: Option<u8>,
    /// Opaque client upload identity.
    pub fingerprint: String,
    /// Processing status.
    pub status: ClipStatus,
    /// Source URI submitted at completion.
    pub src_uri: Option<String>,
    /// HLS master URL once transcoded.
    pub hls_url: Option<String>,
    /// Progressive MP4 URL, when produced.
    pub mp4_url: Option<String>,
    /// Thumbnail URL.
    pub thumb_url: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Failure detail when status is failed.
    pub error: Option<String>,
    /// Visibility: `private`, `event`, `friends` or `public`.
    pub visibility: String,
    /// Reaction sub-state.
    pub reactions: Reactions,
    /// Strokes-gained delta attached by analytics, when known.
    pub sg_delta: Option<f64>,
    /// AI commentary title.
    pub ai_title: Option<String>,
    /// AI commentary summary.
    pub ai_summary: Option<String>,
    /// AI commentary TTS audio URL.
    pub ai_tts_url: Option<String>,
    /// Creation time of the placeholder.
    pub created_at: OffsetDateTime,
}

impl ClipRecord {
    /// Ranking weight at `now`: recent + α·ln(1+total) + β·exp(−age/3600).
    pub fn weight(&self, now: OffsetDateTime, config: &ClipsConfig) -> f64 {
        let recent = self.reactions.recent_count(now, config.recent_window_secs) as f64;
        let total = self.reactions.total() as f64;
        let age_s = ((now - self.created_at).whole_seconds().max(0)) as f64;
        recent + config.weight_alpha * (1.0 + total).ln()
            + config.weight_beta * (-age_s / 3600.0).exp()
    }
}

/// Result of a reaction attempt on an existing clip.
#[derive(Debug, Clone, Copy)]
pub struct ReactionResult {
    /// False when the member is inside the rate-limit window.
    pub accepted: bool,
    /// Reactions currently inside the recent window.
    pub recent_count: usize,
}

/// Abstraction over clip persistence.
pub trait ClipsRepository: Send + Sync {
    /// Create a queued placeholder and return its id.
    fn create_placeholder(
        &self,
        event_id: Uuid,
        player_id: Uuid,
        hole: Option<u8>,
        fingerprint: &str,
        visibility: Option<String>,
    ) -> Uuid;

    /// Move a placeholder to processing with its source URI.
    fn mark_processing(&self, clip_id: Uuid, src_uri: &str) -> bool;

    /// Mark a clip playable with its produced assets.
    fn mark_ready(
        &self,
        clip_id: Uuid,
        hls_url: &str,
        mp4_url: Option<String>,
        thumb_url: Option<String>,
        duration_ms: Option<u64>,
    ) -> bool;

    /// Mark a clip failed.
    fn mark_failed(&self, clip_id: Uuid, error: Option<String>) -> bool;

    /// Ready clips of one event, newest first.
    fn list_ready(
        &self,
        event_id: Uuid,
        after: Option<OffsetDateTime>,
        limit: usize,
        visibility: Option<&str>,
    ) -> Vec<ClipRecord>;

    /// Ready clips across all events, newest first.
    fn list_recent(&self, limit: usize) -> Vec<ClipRecord>;

    /// Fetch one clip.
    fn fetch(&self, clip_id: Uuid) -> Option<ClipRecord>;

    /// Record a reaction; `None` when the clip does not exist.
    fn add_reaction(&self, clip_id: Uuid, member_id: &str, emoji: &str)
    -> Option<ReactionResult>;

    /// Attach generated commentary to the clip.
    fn update_ai_commentary(
        &self,
        clip_id: Uuid,
        title: &str,
        summary: &str,
        tts_url: Option<String>,
    ) -> bool;
}

/// Default in-memory repository.
pub struct InMemoryClipsRepository {
    clips: DashMap<Uuid, ClipRecord>,
    config: ClipsConfig,
}

impl InMemoryClipsRepository {
    /// Build an empty repository with the given limits.
    pub fn new(config: ClipsConfig) -> Self {
        Self {
            clips: DashMap::new(),
            config,
        }
    }

    pub(crate) fn add_reaction_at(
        &self,
        clip_id: Uuid,
        member_id: &str,
        emoji: &str,
        now: OffsetDateTime,
    ) -> Option<ReactionResult> {
        let mut clip = self.clips.get_mut(&clip_id)?;
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Some(ReactionResult {
                accepted: false,
                recent_count: clip
                    .reactions
                    .recent_count(now, self.config.recent_window_secs),
            });
        }

        if let Some(last) = clip.reactions.users.get(member_id) {
            let elapsed = (now - last.at).whole_seconds();
            if elapsed < self.config.reaction_rate_limit_secs as i64 {
                return Some(ReactionResult {
                    accepted: false,
                    recent_count: clip
                        .reactions
                        .recent_count(now, self.config.recent_window_secs),
                });
            }
        }

        let entry = ReactionEntry {
            emoji: emoji.to_string(),
            at: now,
        };
        *clip.reactions.counts.entry(emoji.to_string()).or_insert(0) += 1;
        clip.reactions
            .users
            .insert(member_id.to_string(), entry.clone());
        clip.reactions.recent.push(entry);
        let window = self.config.recent_window_secs as i64;
        clip.reactions
            .recent
            .retain(|entry| (now - entry.at).whole_seconds() <= window);
        let recent_count = clip.reactions.recent.len();
        Some(ReactionResult {
            accepted: true,
            recent_count,
        })
    }

    fn ready_sorted(&self, mut clips: Vec<ClipRecord>, limit: usize) -> Vec<ClipRecord> {
        clips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        clips.truncate(limit);
        clips
    }
}

impl ClipsRepository for InMemoryClipsRepository {
    fn create_placeholder(
        &self,
        event_id: Uuid,
        player_id: Uuid,
        hole: Option<u8>,
        fingerprint: &str,
        visibility: Option<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.clips.insert(
            id,
            ClipRecord {
                id,
                event_id,
                player_id,
                round_id: None,
                hole,
                fingerprint: fingerprint.to_string(),
                status: ClipStatus::Queued,
                src_uri: None,
                hls_url: None,
                mp4_url: None,
                thumb_url: None,
                duration_ms: None,
                error: None,
                visibility: visibility
                    .unwrap_or_else(|| self.config.default_visibility.clone()),
                reactions: Reactions::default(),
                sg_delta: None,
                ai_title: None,
                ai_summary: None,
                ai_tts_url: None,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        id
    }

    fn mark_processing(&self, clip_id: Uuid, src_uri: &str) -> bool {
        let Some(mut clip) = self.clips.get_mut(&clip_id) else {
            return false;
        };
        clip.status = ClipStatus::Processing;
        clip.src_uri = Some(src_uri.to_string());
        true
    }

    fn mark_ready(
        &self,
        clip_id: Uuid,
        hls_url: &str,
        mp4_url: Option<String>,
        thumb_url: Option<String>,
        duration_ms: Option<u64>,
    ) -> bool {
        let Some(mut clip) = self.clips.get_mut(&clip_id) else {
            return false;
        };
        clip.status = ClipStatus::Ready;
        clip.hls_url = Some(hls_url.to_string());
        clip.mp4_url = mp4_url;
        clip.thumb_url = thumb_url;
        clip.duration_ms = duration_ms;
        true
    }

    fn mark_failed(&self, clip_id: Uuid, error: Option<String>) -> bool {
        let Some(mut clip) = self.clips.get_mut(&clip_id) else {
            return false;
        };
        clip.status = ClipStatus::Failed;
        clip.error = error;
        true
    }

    fn list_ready(
        &self,
        event_id: Uuid,
        after: Option<OffsetDateTime>,
        limit: usize,
        visibility: Option<&str>,
    ) -> Vec<ClipRecord> {
        let clips = self
            .clips
            .iter()
            .filter(|entry| {
                let clip = entry.value();
                clip.event_id == event_id
                    && clip.status == ClipStatus::Ready
                    && after.is_none_or(|after| clip.created_at > after)
                    && visibility.is_none_or(|visibility| clip.visibility == visibility)
            })
            .map(|entry| entry.value().clone())
            .collect();
        self.ready_sorted(clips, limit)
    }

    fn list_recent(&self, limit: usize) -> Vec<ClipRecord> {
        let clips = self
            .clips
            .iter()
            .filter(|entry| entry.value().status == ClipStatus::Ready)
            .map(|entry| entry.value().clone())
            .collect();
        self.ready_sorted(clips, limit)
    }

    fn fetch(&self, clip_id: Uuid) -> Option<ClipRecord> {
        self.clips.get(&clip_id).map(|entry| entry.value().clone())
    }

    fn add_reaction(
        &self,
        clip_id: Uuid,
        member_id: &str,
        emoji: &str,
    ) -> Option<ReactionResult> {
        self.add_reaction_at(clip_id, member_id, emoji, OffsetDateTime::now_utc())
    }

    fn update_ai_commentary(
        &self,
        clip_id: Uuid,
        title: &str,
        summary: &str,
        tts_url: Option<String>,
    ) -> bool {
        let Some(mut clip) = self.clips.get_mut(&clip_id) else {
            return false;
        };
        clip.ai_title = Some(title.to_string());
        clip.ai_summary = Some(summary.to_string());
        clip.ai_tts_url = tts_url;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use time::Duration;

    fn repo() -> InMemoryClipsRepository {
        InMemoryClipsRepository::new(AppConfig::default().clips)
    }

    fn ready_clip(repo: &InMemoryClipsRepository, event: Uuid) -> Uuid {
        let clip = repo.create_placeholder(event, Uuid::new_v4(), Some(7), "fp", None);
        assert!(repo.mark_processing(clip, "https://example.com/raw.mp4"));
        assert!(repo.mark_ready(
            clip,
            "https://cdn/clips/master.m3u8",
            None,
            Some("https://cdn/thumb.jpg".into()),
            Some(12_000),
        ));
        clip
    }

    #[test]
    fn lifecycle_reaches_ready_with_assets() {
        let repo = repo();
        let event = Uuid::new_v4();
        let clip_id = ready_clip(&repo, event);

        let clip = repo.fetch(clip_id).unwrap();
        assert_eq!(clip.status, ClipStatus::Ready);
        assert_eq!(clip.hls_url.as_deref(), Some("https://cdn/clips/master.m3u8"));
        assert_eq!(clip.visibility, "event");

        let listed = repo.list_ready(event, None, 10, None);
        assert_eq!(listed.len(), 1);
        assert!(repo.list_ready(Uuid::new_v4(), None, 10, None).is_empty());
    }

    #[test]
    fn failed_clips_stay_out_of_listings() {
        let repo = repo();
        let event = Uuid::new_v4();
        let clip = repo.create_placeholder(event, Uuid::new_v4(), None, "fp", None);
        assert!(repo.mark_failed(clip, Some("boom".into())));
        assert!(repo.list_ready(event, None, 10, None).is_empty());
        assert_eq!(repo.fetch(clip).unwrap().status, ClipStatus::Failed);
    }

    #[test]
    fn reaction_rate_limit_per_member() {
        let repo = repo();
        let clip = ready_clip(&repo, Uuid::new_v4());
        let start = OffsetDateTime::now_utc();

        let first = repo.add_reaction_at(clip, "m1", "🔥", start).unwrap();
        assert!(first.accepted);
        let blocked = repo
            .add_reaction_at(clip, "m1", "🔥", start + Duration::seconds(5))
            .unwrap();
        assert!(!blocked.accepted);
        // Another member is unaffected.
        let other = repo
            .add_reaction_at(clip, "m2", "👏", start + Duration::seconds(5))
            .unwrap();
        assert!(other.accepted);
        // After the limit passes the same member may react again.
        let later = repo
            .add_reaction_at(clip, "m1", "🎯", start + Duration::seconds(11))
            .unwrap();
        assert!(later.accepted);

        let clip = repo.fetch(clip).unwrap();
        assert_eq!(clip.reactions.total(), 3);
        assert_eq!(clip.reactions.users.get("m1").unwrap().emoji, "🎯");
    }

    #[test]
    fn recent_window_slides() {
        let repo = repo();
        let clip = ready_clip(&repo, Uuid::new_v4());
        let start = OffsetDateTime::now_utc();
        repo.add_reaction_at(clip, "m1", "🔥", start).unwrap();
        let result = repo
            .add_reaction_at(clip, "m2", "👏", start + Duration::seconds(90))
            .unwrap();
        // The first reaction fell out of the 60s window.
        assert_eq!(result.recent_count, 1);

        let record = repo.fetch(clip).unwrap();
        assert_eq!(record.reactions.total(), 2);
    }

    #[test]
    fn weight_combines_recent_total_and_age() {
        let repo = repo();
        let clip_id = ready_clip(&repo, Uuid::new_v4());
        let now = OffsetDateTime::now_utc();
        repo.add_reaction_at(clip_id, "m1", "🔥", now).unwrap();

        let clip = repo.fetch(clip_id).unwrap();
        let config = AppConfig::default().clips;
        let weight = clip.weight(now, &config);
        // 1 recent + 1.5·ln(2) + 0.5·exp(≈0)
        let expected = 1.0 + 1.5 * 2.0f64.ln() + 0.5;
        assert!((weight - expected).abs() < 0.01, "weight {weight}");

        // No reactions and one hour of age decays toward zero.
        let stale = ClipRecord {
            created_at: now - Duration::hours(1),
            reactions: Reactions::default(),
            ..clip
        };
        let stale_weight = stale.weight(now, &config);
        assert!(stale_weight < 0.2, "stale weight {stale_weight}");
    }

    #[test]
    fn missing_clip_returns_none() {
        let repo = repo();
        assert!(repo.add_reaction(Uuid::new_v4(), "m1", "🔥").is_none());
        assert!(!repo.mark_processing(Uuid::new_v4(), "src"));
    }
}
