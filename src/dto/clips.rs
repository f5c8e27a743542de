//! Clip upload, reaction and listing payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::ClipsConfig;
use crate::dto::format_timestamp;
use crate::media::MediaUrls;
use crate::store::clips::ClipRecord;

/// Payload requesting a presigned upload slot.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    /// Upload content type; mp4 or quicktime.
    #[validate(length(min = 1))]
    pub content_type: String,
    /// Upload size in bytes.
    pub size_bytes: u64,
    /// Hole the shot was taken on.
    #[serde(default)]
    #[validate(range(min = 1, max = 18))]
    pub hole: Option<u8>,
    /// Opaque client upload identity.
    #[validate(length(min = 1, max = 128))]
    pub fingerprint: String,
    /// Requested visibility; the configured default applies when absent.
    #[serde(default)]
    pub visibility: Option<String>,
}

/// A presigned upload slot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    /// Placeholder clip id.
    pub clip_id: Uuid,
    /// Upload target.
    pub url: String,
    /// HTTP method to use.
    pub method: String,
    /// Content type the upload must carry.
    pub content_type: String,
    /// Slot expiry.
    pub expires_at: String,
}

/// Upload completion payload.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    /// Where the uploaded bytes landed.
    #[validate(length(min = 1))]
    pub src_uri: String,
}

/// Completion outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    /// Clip id.
    pub id: Uuid,
    /// Status after completion; always `processing`.
    pub status: String,
}

/// A reaction to a clip.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReactRequest {
    /// Emoji reacted with.
    #[validate(length(min = 1, max = 16))]
    pub emoji: String,
}

/// Reaction outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReactResponse {
    /// Whether the reaction was recorded.
    pub ok: bool,
    /// Reactions inside the recent window.
    pub recent_count: usize,
}

/// Reaction summary on a public clip.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReactionsDto {
    /// Total count per emoji.
    pub counts: HashMap<String, u64>,
    /// Reactions inside the recent window.
    pub recent_count: usize,
    /// Total reactions.
    pub total: u64,
}

/// Public clip representation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipPublic {
    /// Clip id.
    pub id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Player who captured the shot.
    pub player_id: Uuid,
    /// Linked round.
    pub round_id: Option<Uuid>,
    /// Hole number.
    pub hole: Option<u8>,
    /// Processing status.
    pub status: String,
    /// HLS master URL, CDN-rewritten.
    pub hls_url: Option<String>,
    /// Progressive MP4 URL, CDN-rewritten.
    pub mp4_url: Option<String>,
    /// Thumbnail URL, CDN-rewritten or derived from the video.
    pub thumb_url: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Opaque upload identity.
    pub fingerprint: String,
    /// Visibility level.
    pub visibility: String,
    /// Placeholder creation time.
    pub created_at: String,
    /// Reaction summary.
    pub reactions: ReactionsDto,
    /// Ranking weight at serialization time.
    pub weight: f64,
    /// AI commentary title, when generated.
    pub ai_title: Option<String>,
    /// AI commentary summary, when generated.
    pub ai_summary: Option<String>,
    /// AI commentary TTS URL, when synthesised.
    pub ai_tts_url: Option<String>,
}

impl ClipPublic {
    /// Produce the external view of a clip at `now`.
    pub fn from_record(
        record: &ClipRecord,
        config: &ClipsConfig,
        media: &MediaUrls,
        now: OffsetDateTime,
    ) -> Self {
        let recent_count = record.reactions.recent_count(now, config.recent_window_secs);
        ClipPublic {
            id: record.id,
            event_id: record.event_id,
            player_id: record.player_id,
            round_id: record.round_id,
            hole: record.hole,
            status: record.status.as_str().to_string(),
            hls_url: media.rewrite_opt(record.hls_url.as_deref()),
            mp4_url: media.rewrite_opt(record.mp4_url.as_deref()),
            thumb_url: media
                .resolve_thumb(record.thumb_url.as_deref(), record.hls_url.as_deref()),
            duration_ms: record.duration_ms,
            fingerprint: record.fingerprint.clone(),
            visibility: record.visibility.clone(),
            created_at: format_timestamp(record.created_at),
            reactions: ReactionsDto {
                counts: record.reactions.counts.clone(),
                recent_count,
                total: record.reactions.total(),
            },
            weight: record.weight(now, config),
            ai_title: record.ai_title.clone(),
            ai_summary: record.ai_summary.clone(),
            ai_tts_url: record.ai_tts_url.clone(),
        }
    }
}

/// Clip listing query.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClipListQuery {
    /// Only clips created after this RFC 3339 instant.
    #[serde(default)]
    pub after: Option<String>,
    /// Maximum items to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Clip listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipListResponse {
    /// Clips, newest first.
    pub items: Vec<ClipPublic>,
}
