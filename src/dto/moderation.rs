//! Moderation report and action payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::clips::ClipPublic;
use crate::dto::format_timestamp;
use crate::store::moderation::{ClipModerationState, ReportRecord};

/// Payload filing a report against a clip.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Reason for the report.
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
    /// Free-form detail payload.
    #[serde(default)]
    pub details: Option<Value>,
    /// Reporter identity when known.
    #[serde(default)]
    pub reporter: Option<String>,
}

/// A filed report.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    /// Report id.
    pub id: String,
    /// Reported clip.
    pub clip_id: Uuid,
    /// Filing time.
    pub ts: String,
    /// Reason given.
    pub reason: String,
    /// `open` until an action resolves it.
    pub status: String,
}

impl From<ReportRecord> for ReportResponse {
    fn from(report: ReportRecord) -> Self {
        ReportResponse {
            id: report.id,
            clip_id: report.clip_id,
            ts: format_timestamp(report.ts),
            status: if report.resolved_ts.is_some() {
                "resolved".into()
            } else {
                "open".into()
            },
            reason: report.reason,
        }
    }
}

/// Payload applying a moderation action.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// `hide`, `unhide` or `set_visibility`.
    pub action: String,
    /// Target visibility; required for `set_visibility`.
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Moderation state of one clip.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerationStateDto {
    /// Clip id.
    pub clip_id: Uuid,
    /// Hidden from non-admins.
    pub hidden: bool,
    /// Visibility level.
    pub visibility: String,
    /// Open report count.
    pub reports: usize,
    /// Last state change.
    pub updated_ts: String,
}

impl From<ClipModerationState> for ModerationStateDto {
    fn from(state: ClipModerationState) -> Self {
        ModerationStateDto {
            clip_id: state.clip_id,
            hidden: state.hidden,
            visibility: state.visibility.as_str().to_string(),
            reports: state.open_reports,
            updated_ts: format_timestamp(state.updated_ts),
        }
    }
}

/// Admin moderation queue query.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct QueueQuery {
    /// `open` (default) or `all`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Admin moderation queue.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    /// Clip states, newest-updated first.
    pub items: Vec<ModerationStateDto>,
}

/// A clip joined with its moderation state, for the admin clips feed.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModeratedClipDto {
    /// The clip itself.
    #[serde(flatten)]
    pub clip: ClipPublic,
    /// Hidden from non-admins.
    pub hidden: bool,
    /// Moderation-level visibility.
    pub moderation_visibility: String,
    /// Open report count.
    pub open_reports: usize,
}

/// Admin clips feed for one event.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipsFeedResponse {
    /// Clips with moderation state, newest first.
    pub items: Vec<ModeratedClipDto>,
}
