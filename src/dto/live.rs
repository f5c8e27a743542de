//! Live stream and viewer token payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::format_timestamp_opt;
use crate::store::live::LiveStatus;

/// Payload to start a stream.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartLiveRequest {
    /// Ingest source label; `mock` runs without a real ingest.
    #[serde(default)]
    pub source: Option<String>,
}

/// Stream start outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartLiveResponse {
    /// Always true after a successful start.
    pub running: bool,
    /// Manifest path.
    pub hls_path: String,
    /// Start time.
    pub started_at: Option<String>,
}

/// Stream stop outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopLiveResponse {
    /// False when no stream was running.
    pub stopped: bool,
}

/// Stream status; `hlsPath` appears only for token-verified callers.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatusResponse {
    /// Whether a stream is running.
    pub running: bool,
    /// Start time.
    pub started_at: Option<String>,
    /// Distinct registered viewers.
    pub viewers: usize,
    /// Manifest path; stripped for unverified callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_path: Option<String>,
}

impl LiveStatusResponse {
    /// Build from a supervisor snapshot, keeping the path only for
    /// verified callers.
    pub fn from_status(status: LiveStatus, reveal_path: bool) -> Self {
        LiveStatusResponse {
            running: status.running,
            started_at: format_timestamp_opt(status.started_at),
            viewers: status.viewers,
            hls_path: if reveal_path { status.hls_path } else { None },
        }
    }
}

/// Stream status query.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LiveStatusQuery {
    /// Viewer token revealing the manifest path.
    #[serde(default)]
    pub token: Option<String>,
}

/// Payload to mint a viewer token.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MintTokenRequest {
    /// Token lifetime in seconds; clamped to at least 1. Default 900.
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// A minted viewer token.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintTokenResponse {
    /// Opaque viewer token.
    pub token: String,
    /// Expiry as unix seconds.
    pub exp: i64,
    /// Viewer id embedded in the token.
    pub viewer_id: String,
}

/// Shareable viewer link carrying an invite.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewerLinkResponse {
    /// Web URL with the percent-encoded invite attached.
    pub url: String,
}

/// Payload to exchange an invite for a viewer token.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInviteRequest {
    /// Invite envelope.
    #[validate(length(min = 1))]
    pub invite: String,
}

/// Exchange outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInviteResponse {
    /// Fresh viewer token bound to the invite's event.
    pub token: String,
    /// Expiry as unix seconds.
    pub exp: i64,
}
