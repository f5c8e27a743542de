//! Event, scoring and leaderboard payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::{format_timestamp, format_timestamp_opt};
use crate::store::board::{Board, BoardRow};
use crate::store::events::{
    EventRecord, EventSettings, ScorecardRecord, SettingsPatch, TvFlags, TvFlagsPatch,
};

/// Payload to create an event.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// Display name.
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    /// Optional display emoji.
    #[serde(default)]
    pub emoji: Option<String>,
}

/// Response after creating an event.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventResponse {
    /// Event id.
    pub id: Uuid,
    /// Join code.
    pub code: String,
    /// Join URL for spectators.
    pub join_url: String,
    /// QR rendering of the join URL.
    pub qr_svg: String,
}

/// Payload to join an event by code.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Display name of the joining spectator.
    #[serde(default)]
    pub name: Option<String>,
}

/// Response after joining.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// Event joined.
    pub event_id: Uuid,
    /// Member id assigned to the spectator.
    pub member_id: String,
    /// Role granted.
    pub role: String,
}

/// One scorecard registration entry.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    /// Scorecard id, unique per event.
    #[validate(length(min = 1, max = 64))]
    pub scorecard_id: String,
    /// Display name.
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    /// Handicap index.
    #[serde(default)]
    pub hcp_index: Option<f64>,
    /// Playing handicap.
    #[serde(default)]
    pub playing_handicap: Option<f64>,
}

impl From<PlayerEntry> for ScorecardRecord {
    fn from(entry: PlayerEntry) -> Self {
        ScorecardRecord {
            scorecard_id: entry.scorecard_id,
            name: entry.name,
            hcp_index: entry.hcp_index,
            playing_handicap: entry.playing_handicap,
        }
    }
}

impl From<ScorecardRecord> for PlayerEntry {
    fn from(card: ScorecardRecord) -> Self {
        PlayerEntry {
            scorecard_id: card.scorecard_id,
            name: card.name,
            hcp_index: card.hcp_index,
            playing_handicap: card.playing_handicap,
        }
    }
}

/// Batch scorecard registration.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPlayersRequest {
    /// Scorecards to register; must not be empty.
    #[validate(length(min = 1), nested)]
    pub players: Vec<PlayerEntry>,
}

/// Registration outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPlayersResponse {
    /// Number of scorecards registered.
    pub registered: usize,
}

/// Registered players of an event.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayersResponse {
    /// Scorecards in registration order.
    pub players: Vec<PlayerEntry>,
}

/// One hole score write.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    /// Target scorecard.
    #[validate(length(min = 1, max = 64))]
    pub scorecard_id: String,
    /// Hole number.
    #[validate(range(min = 1, max = 18))]
    pub hole: u8,
    /// Gross strokes.
    #[validate(range(min = 1))]
    pub gross: i64,
    /// Net strokes.
    #[serde(default)]
    pub net: Option<i64>,
    /// Stableford points.
    #[serde(default)]
    pub stableford: Option<i64>,
    /// Hole par.
    #[serde(default)]
    pub par: Option<i64>,
    /// Strokes received.
    #[serde(default)]
    pub strokes_received: Option<i64>,
    /// Opaque write identity.
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Client revision; defaults to 1.
    #[serde(default)]
    pub revision: Option<i64>,
}

impl ScoreRequest {
    /// Normalised payload used for fingerprint-less idempotency checks.
    pub fn normalized_payload(&self) -> Value {
        serde_json::json!({
            "gross": self.gross,
            "net": self.net,
            "stableford": self.stableford,
            "par": self.par,
            "strokesReceived": self.strokes_received,
        })
    }
}

/// Outcome of an accepted score write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    /// Always true for accepted writes.
    pub ok: bool,
    /// True when the write replayed the persisted one.
    pub idempotent: bool,
    /// Revision now persisted.
    pub revision: i64,
}

/// Leaderboard query.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BoardQuery {
    /// Format override; the event setting applies when absent.
    #[serde(default)]
    pub format: Option<String>,
}

/// One leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardRowDto {
    /// Scorecard id.
    pub scorecard_id: String,
    /// Display name.
    pub name: String,
    /// Total gross.
    pub gross: i64,
    /// Total net.
    pub net: i64,
    /// Total stableford points.
    pub stableford: Option<i64>,
    /// Holes completed.
    pub thru: u8,
    /// Next hole to play.
    pub hole: Option<u8>,
    /// Latest cumulative under-par moment.
    pub last_under_par_at: Option<String>,
    /// Round completion time.
    pub finished_at: Option<String>,
    /// Latest write for the row.
    pub updated_at: Option<String>,
}

impl From<BoardRow> for BoardRowDto {
    fn from(row: BoardRow) -> Self {
        BoardRowDto {
            scorecard_id: row.scorecard_id,
            name: row.name,
            gross: row.gross,
            net: row.net,
            stableford: row.stableford,
            thru: row.thru,
            hole: row.hole,
            last_under_par_at: format_timestamp_opt(row.last_under_par_at),
            finished_at: format_timestamp_opt(row.finished_at),
            updated_at: format_timestamp_opt(row.updated_at),
        }
    }
}

/// A built leaderboard.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    /// Format the rows are sorted under.
    pub gross_net: String,
    /// Sorted rows.
    pub players: Vec<BoardRowDto>,
    /// Latest write across all rows.
    pub updated_at: Option<String>,
}

impl From<Board> for BoardResponse {
    fn from(board: Board) -> Self {
        BoardResponse {
            gross_net: board.gross_net,
            updated_at: format_timestamp_opt(board.updated_at),
            players: board.players.into_iter().map(BoardRowDto::from).collect(),
        }
    }
}

/// TV flag fields of a settings patch.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TvFlagsRequest {
    /// QR overlay toggle.
    #[serde(default)]
    pub show_qr_overlay: Option<bool>,
    /// Clip auto-rotation toggle.
    #[serde(default)]
    pub auto_rotate_top: Option<bool>,
    /// Rotation interval override.
    #[serde(default)]
    pub rotate_interval_ms: Option<u64>,
    /// Safety flag.
    #[serde(default)]
    pub safe: Option<bool>,
    /// Tournament-safety flag.
    #[serde(default)]
    pub tournament_safe: Option<bool>,
}

/// Settings patch.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    /// Board format.
    #[serde(default)]
    pub gross_net: Option<String>,
    /// TV flags.
    #[serde(default)]
    pub tv_flags: Option<TvFlagsRequest>,
}

impl From<SettingsRequest> for SettingsPatch {
    fn from(request: SettingsRequest) -> Self {
        SettingsPatch {
            gross_net: request.gross_net,
            tv_flags: request.tv_flags.map(|flags| TvFlagsPatch {
                show_qr_overlay: flags.show_qr_overlay,
                auto_rotate_top: flags.auto_rotate_top,
                rotate_interval_ms: flags.rotate_interval_ms,
                safe: flags.safe,
                tournament_safe: flags.tournament_safe,
            }),
        }
    }
}

/// TV flags as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TvFlagsDto {
    /// QR overlay toggle.
    pub show_qr_overlay: bool,
    /// Clip auto-rotation toggle.
    pub auto_rotate_top: bool,
    /// Rotation interval.
    pub rotate_interval_ms: u64,
    /// Safety flag.
    pub safe: bool,
    /// Tournament-safety flag.
    pub tournament_safe: bool,
}

impl From<TvFlags> for TvFlagsDto {
    fn from(flags: TvFlags) -> Self {
        TvFlagsDto {
            show_qr_overlay: flags.show_qr_overlay,
            auto_rotate_top: flags.auto_rotate_top,
            rotate_interval_ms: flags.rotate_interval_ms,
            safe: flags.safe,
            tournament_safe: flags.tournament_safe,
        }
    }
}

/// Event settings as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    /// Board format.
    pub gross_net: String,
    /// TV flags in effect.
    pub tv_flags: TvFlagsDto,
}

impl From<EventSettings> for SettingsResponse {
    fn from(settings: EventSettings) -> Self {
        SettingsResponse {
            gross_net: settings.gross_net,
            tv_flags: settings.tv_flags.into(),
        }
    }
}

/// Status change payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    /// Target status: pending, live, paused or closed.
    pub status: String,
}

/// Status change outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Event id.
    pub id: Uuid,
    /// Status now in effect.
    pub status: String,
}

/// Response after regenerating the join code.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodeRegenerateResponse {
    /// New join code; the old one no longer resolves.
    pub code: String,
    /// Join URL for the new code.
    pub join_url: String,
    /// QR rendering of the new join URL.
    pub qr_svg: String,
}

/// Host console state.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostStateResponse {
    /// Event id.
    pub id: Uuid,
    /// Current join code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Display emoji.
    pub emoji: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Settings in effect.
    pub settings: SettingsResponse,
    /// Join URL.
    pub join_url: String,
    /// QR rendering of the join URL; always present.
    pub qr_svg: String,
    /// Joined member count.
    pub members: usize,
    /// Creation time.
    pub created_at: String,
}

impl HostStateResponse {
    /// Assemble the host state from an event record.
    pub fn from_event(event: EventRecord, join_url: String, qr_svg: String, members: usize) -> Self {
        HostStateResponse {
            id: event.id,
            code: event.code,
            name: event.name,
            emoji: event.emoji,
            status: event.status.as_str().to_string(),
            settings: event.settings.into(),
            join_url,
            qr_svg,
            members,
            created_at: format_timestamp(event.created_at),
        }
    }
}
