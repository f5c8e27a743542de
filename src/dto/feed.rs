//! Home feed payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::clips::ClipPublic;

/// Home feed query.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct HomeQuery {
    /// Maximum top shots to return; clamped server-side.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One running live stream on the home feed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LiveEntryDto {
    /// Event streaming right now.
    pub event_id: Uuid,
    /// Distinct registered viewers.
    pub viewers: usize,
    /// Stream start time.
    pub started_at: Option<String>,
    /// Manifest path.
    pub live_path: Option<String>,
}

/// The home feed.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HomeResponse {
    /// Ranked public clips.
    pub top_shots: Vec<ClipPublic>,
    /// Running streams, newest first.
    pub live: Vec<LiveEntryDto>,
    /// Snapshot refresh time.
    pub updated_at: String,
}
