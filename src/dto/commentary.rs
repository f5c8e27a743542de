//! Commentary queue payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::format_timestamp;
use crate::services::commentary_service::CommentaryResult;
use crate::store::commentary::CommentaryRecord;

/// One commentary queue entry.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryDto {
    /// Clip the commentary is for.
    pub clip_id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Queue state.
    pub status: String,
    /// Generated title, once ready.
    pub title: Option<String>,
    /// Generated summary, once ready.
    pub summary: Option<String>,
    /// TTS audio URL when synthesised.
    pub tts_url: Option<String>,
    /// Strokes-gained delta resolved from the clip.
    pub sg_delta: Option<f64>,
    /// Last transition time.
    pub updated_ts: String,
}

impl From<CommentaryRecord> for CommentaryDto {
    fn from(record: CommentaryRecord) -> Self {
        CommentaryDto {
            clip_id: record.clip_id,
            event_id: record.event_id,
            status: record.status.as_str().to_string(),
            title: record.title,
            summary: record.summary,
            tts_url: record.tts_url,
            sg_delta: record.sg_delta,
            updated_ts: format_timestamp(record.updated_ts),
        }
    }
}

/// Commentary listing query.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CommentaryListQuery {
    /// Optional status filter.
    #[serde(default)]
    pub status: Option<String>,
}

/// Commentary listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryListResponse {
    /// Entries, newest first.
    pub items: Vec<CommentaryDto>,
}

/// Outcome of a synchronous generation request.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCommentaryResponse {
    /// Clip the commentary was generated for.
    pub clip_id: Uuid,
    /// Persisted title.
    pub title: String,
    /// Persisted summary.
    pub summary: String,
    /// TTS audio URL when synthesised.
    pub tts_url: Option<String>,
}

impl From<CommentaryResult> for GenerateCommentaryResponse {
    fn from(result: CommentaryResult) -> Self {
        GenerateCommentaryResponse {
            clip_id: result.clip_id,
            title: result.title,
            summary: result.summary,
            tts_url: result.tts_url,
        }
    }
}

/// TTS playback acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayTtsResponse {
    /// Clip id.
    pub clip_id: Uuid,
    /// Audio URL to play.
    pub tts_url: String,
}
