//! Cached home feed snapshots.
//!
//! The snapshot is rebuilt at most once per TTL: ranked public clips plus
//! running live streams, hashed into an ETag over the canonical JSON body.
//! Each response carries a representation ETag that also encodes the clamped
//! limit, so the same snapshot served at different limits never false-matches
//! a conditional request.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::json;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::ClipsConfig;
use crate::dto::clips::ClipPublic;
use crate::dto::feed::{HomeResponse, LiveEntryDto};
use crate::dto::format_timestamp_opt;
use crate::media::MediaUrls;
use crate::state::AppState;
use crate::store::clips::ClipRecord;
use crate::store::live::LiveSupervisor;
use crate::store::moderation::{ModerationStore, Viewer};

const FEED_TTL: Duration = Duration::from_secs(60);
/// Smallest limit a client can ask for.
pub const MIN_LIMIT: usize = 5;
/// Largest limit a client can ask for; also caps the cached snapshot.
pub const MAX_LIMIT: usize = 50;
const DEFAULT_LIMIT: usize = 20;

/// One cached refresh of the home feed.
#[derive(Clone)]
pub struct FeedSnapshot {
    /// Ranked public clips, capped at [`MAX_LIMIT`].
    pub top_shots: Vec<ClipPublic>,
    /// Running streams, newest first.
    pub live: Vec<LiveEntryDto>,
    /// Refresh time.
    pub updated_at: String,
    /// sha256 of the canonical snapshot body.
    pub etag: String,
}

impl FeedSnapshot {
    /// Body and representation token for a clamped `limit`.
    pub fn representation(&self, limit: usize) -> (HomeResponse, String) {
        let body = HomeResponse {
            top_shots: self.top_shots.iter().take(limit).cloned().collect(),
            live: self.live.clone(),
            updated_at: self.updated_at.clone(),
        };
        (body, format!("{};limit={limit}", self.etag))
    }
}

/// TTL-bound cache of the latest [`FeedSnapshot`].
pub struct FeedCache {
    inner: Mutex<Option<(Instant, FeedSnapshot)>>,
}

impl FeedCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// The cached snapshot, when still inside the TTL.
    pub fn fresh(&self) -> Option<FeedSnapshot> {
        let inner = self.inner.lock().expect("feed cache poisoned");
        inner
            .as_ref()
            .filter(|(built, _)| built.elapsed() <= FEED_TTL)
            .map(|(_, snapshot)| snapshot.clone())
    }

    /// Replace the cached snapshot.
    pub fn store(&self, snapshot: FeedSnapshot) {
        let mut inner = self.inner.lock().expect("feed cache poisoned");
        *inner = Some((Instant::now(), snapshot));
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a requested limit into `[MIN_LIMIT, MAX_LIMIT]`.
pub fn clamp_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(MIN_LIMIT, MAX_LIMIT)
}

/// Serve the cached snapshot, refreshing it when stale.
pub async fn home_snapshot(state: &AppState) -> FeedSnapshot {
    if let Some(snapshot) = state.feed.fresh() {
        return snapshot;
    }
    let clips = state.clips().await.list_recent(MAX_LIMIT * 4);
    let snapshot = build_snapshot(
        clips,
        &state.live,
        &state.moderation,
        &state.config.clips,
        &state.media,
        OffsetDateTime::now_utc(),
    );
    state.feed.store(snapshot.clone());
    snapshot
}

/// Assemble a snapshot from store contents at `now`.
pub fn build_snapshot(
    clips: Vec<ClipRecord>,
    live: &LiveSupervisor,
    moderation: &ModerationStore,
    config: &ClipsConfig,
    media: &MediaUrls,
    now: OffsetDateTime,
) -> FeedSnapshot {
    let mut top_shots: Vec<ClipPublic> = clips
        .iter()
        .filter(|clip| {
            clip.visibility == "public" && moderation.visible_to(clip.id, Viewer::Anonymous)
        })
        .map(|clip| ClipPublic::from_record(clip, config, media, now))
        .collect();
    top_shots.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    top_shots.truncate(MAX_LIMIT);

    let live: Vec<LiveEntryDto> = live
        .list_running()
        .into_iter()
        .map(|(event_id, status)| LiveEntryDto {
            event_id,
            viewers: status.viewers,
            started_at: format_timestamp_opt(status.started_at),
            live_path: status.hls_path,
        })
        .collect();

    let updated_at = now.format(&Rfc3339).unwrap_or_default();
    let etag = snapshot_etag(&top_shots, &live, &updated_at);
    FeedSnapshot {
        top_shots,
        live,
        updated_at,
        etag,
    }
}

/// Whether an `If-None-Match` header matches the representation token.
///
/// Accepts raw, quoted and weak (`W/"…"`) forms, comma-separated.
pub fn etag_matches(header: Option<&str>, token: &str) -> bool {
    let Some(header) = header else {
        return false;
    };
    header
        .split(',')
        .map(|candidate| {
            candidate
                .trim()
                .trim_start_matches("W/")
                .trim_matches('"')
        })
        .any(|candidate| candidate == token)
}

fn snapshot_etag(top_shots: &[ClipPublic], live: &[LiveEntryDto], updated_at: &str) -> String {
    // serde_json maps are ordered, so the serialized body is canonical.
    let body = json!({
        "topShots": top_shots,
        "live": live,
        "updatedAt": updated_at,
    });
    let canonical = body.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::store::clips::{ClipsRepository, InMemoryClipsRepository};
    use crate::store::moderation::ModerationAction;
    use uuid::Uuid;

    fn fixtures() -> (InMemoryClipsRepository, LiveSupervisor, ModerationStore, AppConfig) {
        let config = AppConfig::default();
        (
            InMemoryClipsRepository::new(config.clips.clone()),
            LiveSupervisor::new(&config.live),
            ModerationStore::new(None),
            config,
        )
    }

    fn ready_public_clip(repo: &InMemoryClipsRepository) -> Uuid {
        let clip = repo.create_placeholder(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(7),
            "fp",
            Some("public".into()),
        );
        repo.mark_processing(clip, "https://example.com/raw.mp4");
        repo.mark_ready(clip, "/media/clips/master.m3u8", None, None, Some(9_000));
        clip
    }

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(Some(0)), 5);
        assert_eq!(clamp_limit(Some(9999)), 50);
        assert_eq!(clamp_limit(Some(12)), 12);
        assert_eq!(clamp_limit(None), 20);
    }

    #[test]
    fn snapshot_excludes_hidden_and_non_public_clips() {
        let (repo, live, moderation, config) = fixtures();
        let media = MediaUrls::new(&config.media);
        let visible = ready_public_clip(&repo);
        let hidden = ready_public_clip(&repo);
        moderation
            .apply_action(hidden, ModerationAction::Hide, None, None)
            .unwrap();
        // Default visibility is event-scoped, which the home feed never shows.
        let scoped = repo.create_placeholder(Uuid::new_v4(), Uuid::new_v4(), None, "fp", None);
        repo.mark_processing(scoped, "src");
        repo.mark_ready(scoped, "/media/clips/other.m3u8", None, None, None);

        let snapshot = build_snapshot(
            repo.list_recent(200),
            &live,
            &moderation,
            &config.clips,
            &media,
            OffsetDateTime::now_utc(),
        );
        let ids: Vec<Uuid> = snapshot.top_shots.iter().map(|clip| clip.id).collect();
        assert_eq!(ids, vec![visible]);
    }

    #[test]
    fn snapshot_lists_running_streams() {
        let (repo, _, moderation, mut config) = fixtures();
        config.live.mock_prefix = Some("/live-mock".into());
        let live = LiveSupervisor::new(&config.live);
        let media = MediaUrls::new(&config.media);
        let event = Uuid::new_v4();
        live.start(event, "mock").unwrap();

        let snapshot = build_snapshot(
            repo.list_recent(200),
            &live,
            &moderation,
            &config.clips,
            &media,
            OffsetDateTime::now_utc(),
        );
        assert_eq!(snapshot.live.len(), 1);
        assert_eq!(snapshot.live[0].event_id, event);
        assert_eq!(
            snapshot.live[0].live_path.as_deref(),
            Some(format!("/live-mock/{event}/index.m3u8").as_str())
        );
    }

    #[test]
    fn representation_etag_differs_per_limit() {
        let (repo, live, moderation, config) = fixtures();
        let media = MediaUrls::new(&config.media);
        ready_public_clip(&repo);
        let snapshot = build_snapshot(
            repo.list_recent(200),
            &live,
            &moderation,
            &config.clips,
            &media,
            OffsetDateTime::now_utc(),
        );

        let (_, ten) = snapshot.representation(10);
        let (_, thirty) = snapshot.representation(30);
        assert_ne!(ten, thirty);
        assert!(ten.ends_with(";limit=10"));
        // Same snapshot and limit stays byte-identical.
        assert_eq!(ten, snapshot.representation(10).1);
    }

    #[test]
    fn if_none_match_accepts_raw_quoted_and_weak_forms() {
        let token = "abc123;limit=10";
        assert!(etag_matches(Some("abc123;limit=10"), token));
        assert!(etag_matches(Some("\"abc123;limit=10\""), token));
        assert!(etag_matches(Some("W/\"abc123;limit=10\""), token));
        assert!(etag_matches(Some("\"other\", W/\"abc123;limit=10\""), token));
        assert!(!etag_matches(Some("\"abc123;limit=30\""), token));
        assert!(!etag_matches(None, token));
    }

    #[test]
    fn cache_serves_until_replaced() {
        let (repo, live, moderation, config) = fixtures();
        let media = MediaUrls::new(&config.media);
        let cache = FeedCache::new();
        assert!(cache.fresh().is_none());

        let snapshot = build_snapshot(
            repo.list_recent(200),
            &live,
            &moderation,
            &config.clips,
            &media,
            OffsetDateTime::now_utc(),
        );
        cache.store(snapshot.clone());
        assert_eq!(cache.fresh().unwrap().etag, snapshot.etag);
    }
}
