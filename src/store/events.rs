//! Events, members, scorecards and the authoritative scoring engine.
//!
//! One mutex guards the whole store so the code↔event mapping, status
//! transitions and score upserts each hold atomically. Scores follow the
//! fingerprint+revision protocol: higher revisions replace, equal revisions
//! are idempotent only for the same write, anything else conflicts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::codes;
use crate::error::ServiceError;
use crate::store::board::{HoleResult, PlayerScores};
use crate::telemetry;

/// Leaderboard formats an event can run.
pub const FORMATS: &[&str] = &["net", "gross", "stableford"];

/// Event lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Created but not yet started.
    Pending,
    /// Play in progress.
    Live,
    /// Temporarily paused; may resume.
    Paused,
    /// Finished; terminal but still readable.
    Closed,
}

impl EventStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Live => "live",
            EventStatus::Paused => "paused",
            EventStatus::Closed => "closed",
        }
    }

    /// Parse a wire status name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(EventStatus::Pending),
            "live" => Some(EventStatus::Live),
            "paused" => Some(EventStatus::Paused),
            "closed" => Some(EventStatus::Closed),
            _ => None,
        }
    }

    /// Whether moving to `next` respects pending→live↔paused→closed.
    fn can_transition(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            EventStatus::Pending => matches!(next, EventStatus::Live | EventStatus::Closed),
            EventStatus::Live => matches!(next, EventStatus::Paused | EventStatus::Closed),
            EventStatus::Paused => matches!(next, EventStatus::Live | EventStatus::Closed),
            EventStatus::Closed => false,
        }
    }
}

/// TV overlay and tournament-safety flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TvFlags {
    /// Show the join QR overlay on the TV board.
    pub show_qr_overlay: bool,
    /// Auto-rotate through top clips on the TV board.
    pub auto_rotate_top: bool,
    /// Rotation interval in milliseconds.
    pub rotate_interval_ms: u64,
    /// Master safety flag; implies `tournament_safe`.
    pub safe: bool,
    /// Suppresses AI commentary and advice-like output.
    pub tournament_safe: bool,
}

impl Default for TvFlags {
    fn default() -> Self {
        Self {
            show_qr_overlay: true,
            auto_rotate_top: false,
            rotate_interval_ms: 8_000,
            safe: false,
            tournament_safe: false,
        }
    }
}

/// Event settings: board format plus TV flags.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSettings {
    /// Board format: `net`, `gross` or `stableford`.
    pub gross_net: String,
    /// TV overlay and safety flags.
    pub tv_flags: TvFlags,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            gross_net: "net".into(),
            tv_flags: TvFlags::default(),
        }
    }
}

impl EventSettings {
    /// Whether this event is tournament-safe.
    pub fn is_safe(&self) -> bool {
        self.tv_flags.safe || self.tv_flags.tournament_safe
    }
}

/// Partial settings update; absent fields fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    /// Requested board format.
    pub gross_net: Option<String>,
    /// Requested TV flags.
    pub tv_flags: Option<TvFlagsPatch>,
}

/// Partial TV flag update.
#[derive(Debug, Clone, Default)]
pub struct TvFlagsPatch {
    /// QR overlay toggle.
    pub show_qr_overlay: Option<bool>,
    /// Clip auto-rotation toggle.
    pub auto_rotate_top: Option<bool>,
    /// Rotation interval override.
    pub rotate_interval_ms: Option<u64>,
    /// Safety flag.
    pub safe: Option<bool>,
    /// Tournament-safety flag; defaults to `safe` when unspecified.
    pub tournament_safe: Option<bool>,
}

impl SettingsPatch {
    /// Materialise the patch over the defaults.
    fn resolve(self) -> Result<EventSettings, ServiceError> {
        let mut settings = EventSettings::default();
        if let Some(format) = self.gross_net {
            if !FORMATS.contains(&format.as_str()) {
                return Err(ServiceError::InvalidInput(format!(
                    "unknown board format: {format}"
                )));
            }
            settings.gross_net = format;
        }
        if let Some(flags) = self.tv_flags {
            let defaults = TvFlags::default();
            let safe = flags.safe.unwrap_or(defaults.safe);
            settings.tv_flags = TvFlags {
                show_qr_overlay: flags.show_qr_overlay.unwrap_or(defaults.show_qr_overlay),
                auto_rotate_top: flags.auto_rotate_top.unwrap_or(defaults.auto_rotate_top),
                rotate_interval_ms: flags
                    .rotate_interval_ms
                    .unwrap_or(defaults.rotate_interval_ms),
                safe,
                // safe implies tournament-safe.
                tournament_safe: flags.tournament_safe.unwrap_or(safe) || safe,
            };
        }
        Ok(settings)
    }
}

/// Roles carried in the `x-event-role` header and on member rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    /// Event administrator.
    Admin,
    /// Event host; equivalent to admin for gating.
    Host,
    /// Read-mostly viewer.
    Spectator,
    /// Playing participant.
    Player,
}

impl MemberRole {
    /// Parse a wire role name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(MemberRole::Admin),
            "host" => Some(MemberRole::Host),
            "spectator" => Some(MemberRole::Spectator),
            "player" => Some(MemberRole::Player),
            _ => None,
        }
    }

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Host => "host",
            MemberRole::Spectator => "spectator",
            MemberRole::Player => "player",
        }
    }

    /// Admin and host are interchangeable for gating.
    pub fn is_admin(self) -> bool {
        matches!(self, MemberRole::Admin | MemberRole::Host)
    }
}

/// A registered event.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Event id.
    pub id: Uuid,
    /// Current join code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Optional display emoji.
    pub emoji: Option<String>,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Settings in effect.
    pub settings: EventSettings,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

/// A joined member of an event.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    /// Opaque member id.
    pub member_id: String,
    /// Role held.
    pub role: MemberRole,
    /// Optional display name.
    pub name: Option<String>,
}

/// A registered scorecard (player entry on the board).
#[derive(Debug, Clone)]
pub struct ScorecardRecord {
    /// Unique id within the event.
    pub scorecard_id: String,
    /// Display name.
    pub name: String,
    /// Handicap index.
    pub hcp_index: Option<f64>,
    /// Playing handicap.
    pub playing_handicap: Option<f64>,
}

/// Incoming score write for one hole.
#[derive(Debug, Clone)]
pub struct ScoreWrite {
    /// Gross strokes.
    pub gross: i64,
    /// Net strokes.
    pub net: Option<i64>,
    /// Stableford points.
    pub stableford: Option<i64>,
    /// Hole par.
    pub par: Option<i64>,
    /// Strokes received on the hole.
    pub strokes_received: Option<i64>,
    /// Opaque write identity; never parsed.
    pub fingerprint: Option<String>,
    /// Client revision; defaults to 1 when absent.
    pub revision: Option<i64>,
    /// Normalised wire payload, kept for fingerprint-less idempotency checks.
    pub payload: Value,
}

/// Persisted state of one hole on one scorecard.
#[derive(Debug, Clone)]
pub struct HoleScore {
    /// Gross strokes.
    pub gross: i64,
    /// Net strokes.
    pub net: Option<i64>,
    /// Stableford points.
    pub stableford: Option<i64>,
    /// Hole par.
    pub par: Option<i64>,
    /// Strokes received.
    pub strokes_received: Option<i64>,
    /// Fingerprint of the write that produced this state.
    pub fingerprint: Option<String>,
    /// Current revision; strictly increases across replacements.
    pub revision: i64,
    /// Normalised payload of the current write.
    pub payload: Value,
    /// Time of the last accepted write.
    pub updated_at: OffsetDateTime,
}

/// Outcome of an accepted score upsert.
#[derive(Debug, Clone, Copy)]
pub struct ScoreOutcome {
    /// True when this write inserted the first record for the hole.
    pub created: bool,
    /// True when the write was a replay of the persisted one.
    pub idempotent: bool,
    /// Revision now persisted.
    pub revision: i64,
}

const CODE_ALLOCATION_ATTEMPTS: usize = 15;

#[derive(Default)]
struct Inner {
    events: HashMap<Uuid, EventRecord>,
    codes: HashMap<String, Uuid>,
    members: HashMap<Uuid, IndexMap<String, MemberRecord>>,
    cards: HashMap<Uuid, IndexMap<String, ScorecardRecord>>,
    scores: HashMap<Uuid, HashMap<(String, u8), HoleScore>>,
}

/// In-memory store of events and everything they own.
#[derive(Default)]
pub struct EventsStore {
    inner: Mutex<Inner>,
}

impl EventsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event: allocate a unique code, seed default settings and a
    /// synthetic host member.
    pub fn create_event(
        &self,
        name: &str,
        emoji: Option<String>,
    ) -> Result<EventRecord, ServiceError> {
        let mut inner = self.inner.lock().expect("events store poisoned");
        let code = allocate_code(&inner.codes)?;
        let event = EventRecord {
            id: Uuid::new_v4(),
            code: code.clone(),
            name: name.to_string(),
            emoji,
            status: EventStatus::Pending,
            settings: EventSettings::default(),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.codes.insert(code, event.id);
        inner.members.entry(event.id).or_default().insert(
            "host".into(),
            MemberRecord {
                member_id: "host".into(),
                role: MemberRole::Host,
                name: None,
            },
        );
        inner.events.insert(event.id, event.clone());
        Ok(event)
    }

    /// Resolve an event id from a join code.
    pub fn resolve_by_code(&self, code: &str) -> Option<Uuid> {
        let inner = self.inner.lock().expect("events store poisoned");
        inner.codes.get(code).copied()
    }

    /// Atomically replace the event's join code; the old code stops
    /// resolving in the same step.
    pub fn regenerate_code(&self, event_id: Uuid) -> Result<String, ServiceError> {
        let mut inner = self.inner.lock().expect("events store poisoned");
        if !inner.events.contains_key(&event_id) {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        let new_code = allocate_code(&inner.codes)?;
        let old_code = inner
            .events
            .get(&event_id)
            .map(|event| event.code.clone())
            .unwrap_or_default();
        inner.codes.remove(&old_code);
        inner.codes.insert(new_code.clone(), event_id);
        if let Some(event) = inner.events.get_mut(&event_id) {
            event.code = new_code.clone();
        }
        Ok(new_code)
    }

    /// Fetch an event by id.
    pub fn get_event(&self, event_id: Uuid) -> Option<EventRecord> {
        let inner = self.inner.lock().expect("events store poisoned");
        inner.events.get(&event_id).cloned()
    }

    /// Register (or refresh) a member row.
    pub fn register_member(
        &self,
        event_id: Uuid,
        member_id: &str,
        role: MemberRole,
        name: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().expect("events store poisoned");
        if !inner.events.contains_key(&event_id) {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        inner.members.entry(event_id).or_default().insert(
            member_id.to_string(),
            MemberRecord {
                member_id: member_id.to_string(),
                role,
                name,
            },
        );
        Ok(())
    }

    /// Number of joined members.
    pub fn member_count(&self, event_id: Uuid) -> usize {
        let inner = self.inner.lock().expect("events store poisoned");
        inner.members.get(&event_id).map_or(0, IndexMap::len)
    }

    /// Display name of a member, when one was given at join time.
    pub fn member_name(&self, event_id: Uuid, member_id: &str) -> Option<String> {
        let inner = self.inner.lock().expect("events store poisoned");
        inner
            .members
            .get(&event_id)
            .and_then(|members| members.get(member_id))
            .and_then(|member| member.name.clone())
    }

    /// Register a batch of scorecards; existing ids are overwritten, never
    /// silently removed.
    pub fn register_scorecards(
        &self,
        event_id: Uuid,
        cards: Vec<ScorecardRecord>,
    ) -> Result<usize, ServiceError> {
        let mut inner = self.inner.lock().expect("events store poisoned");
        if !inner.events.contains_key(&event_id) {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        let registered = inner.cards.entry(event_id).or_default();
        let count = cards.len();
        for card in cards {
            registered.insert(card.scorecard_id.clone(), card);
        }
        Ok(count)
    }

    /// List registered scorecards in registration order.
    pub fn list_scorecards(&self, event_id: Uuid) -> Result<Vec<ScorecardRecord>, ServiceError> {
        let inner = self.inner.lock().expect("events store poisoned");
        if !inner.events.contains_key(&event_id) {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        Ok(inner
            .cards
            .get(&event_id)
            .map(|cards| cards.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Replace event settings with the patch resolved over defaults.
    pub fn update_settings(
        &self,
        event_id: Uuid,
        patch: SettingsPatch,
    ) -> Result<EventSettings, ServiceError> {
        let settings = patch.resolve()?;
        let mut inner = self.inner.lock().expect("events store poisoned");
        let event = inner
            .events
            .get_mut(&event_id)
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;
        event.settings = settings.clone();
        Ok(settings)
    }

    /// Move the event to a new status, enforcing the lifecycle order.
    pub fn set_status(
        &self,
        event_id: Uuid,
        next: EventStatus,
    ) -> Result<EventStatus, ServiceError> {
        let mut inner = self.inner.lock().expect("events store poisoned");
        let event = inner
            .events
            .get_mut(&event_id)
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;
        if !event.status.can_transition(next) {
            return Err(ServiceError::Conflict(format!(
                "cannot move event from {} to {}",
                event.status.as_str(),
                next.as_str()
            )));
        }
        event.status = next;
        Ok(next)
    }

    /// Whether the event is flagged tournament-safe.
    pub fn is_safe(&self, event_id: Uuid) -> bool {
        let inner = self.inner.lock().expect("events store poisoned");
        inner
            .events
            .get(&event_id)
            .map(|event| event.settings.is_safe())
            .unwrap_or(false)
    }

    /// Upsert one hole score under the fingerprint+revision protocol.
    pub fn upsert_score(
        &self,
        event_id: Uuid,
        scorecard_id: &str,
        hole: u8,
        write: ScoreWrite,
    ) -> Result<ScoreOutcome, ServiceError> {
        let started = Instant::now();
        let result = self.apply_score(event_id, scorecard_id, hole, write);

        let status = match &result {
            Ok(outcome) if outcome.idempotent => "idempotent",
            Ok(_) => "ok",
            Err(ServiceError::StaleScore { .. }) => "conflict",
            Err(_) => "error",
        };
        telemetry::emit(
            "score.write_ms",
            json!({
                "status": status,
                "ms": started.elapsed().as_millis() as u64,
            }),
        );
        result
    }

    fn apply_score(
        &self,
        event_id: Uuid,
        scorecard_id: &str,
        hole: u8,
        write: ScoreWrite,
    ) -> Result<ScoreOutcome, ServiceError> {
        if !(1..=18).contains(&hole) {
            return Err(ServiceError::InvalidInput(format!("hole out of range: {hole}")));
        }
        let incoming_revision = write.revision.unwrap_or(1);
        if incoming_revision < 1 {
            return Err(ServiceError::InvalidInput(
                "revision must be a positive integer".into(),
            ));
        }

        let mut inner = self.inner.lock().expect("events store poisoned");
        if !inner.events.contains_key(&event_id) {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        if !inner
            .cards
            .get(&event_id)
            .is_some_and(|cards| cards.contains_key(scorecard_id))
        {
            return Err(ServiceError::NotFound(format!(
                "scorecard {scorecard_id} on event {event_id}"
            )));
        }

        let key = (scorecard_id.to_string(), hole);
        let scores = inner.scores.entry(event_id).or_default();

        let outcome = match scores.get(&key) {
            None => {
                scores.insert(key, stored(write, incoming_revision));
                ScoreOutcome {
                    created: true,
                    idempotent: false,
                    revision: incoming_revision,
                }
            }
            Some(current) if incoming_revision > current.revision => {
                scores.insert(key, stored(write, incoming_revision));
                ScoreOutcome {
                    created: false,
                    idempotent: false,
                    revision: incoming_revision,
                }
            }
            Some(current) if incoming_revision == current.revision => {
                let same_write = match (&write.fingerprint, &current.fingerprint) {
                    (Some(incoming), Some(existing)) => incoming == existing,
                    // Without fingerprints only the identical payload replays.
                    (None, None) => write.payload == current.payload,
                    _ => false,
                };
                if same_write {
                    telemetry::emit(
                        "score.idempotent.accepted",
                        json!({
                            "scorecardId": scorecard_id,
                            "hole": hole,
                            "revision": incoming_revision,
                        }),
                    );
                    ScoreOutcome {
                        created: false,
                        idempotent: true,
                        revision: current.revision,
                    }
                } else {
                    return Err(conflict(scorecard_id, hole, &write, current));
                }
            }
            Some(current) => return Err(conflict(scorecard_id, hole, &write, current)),
        };
        Ok(outcome)
    }

    /// Snapshot the per-player hole results the leaderboard builder consumes.
    pub fn board_input(&self, event_id: Uuid) -> Result<Vec<PlayerScores>, ServiceError> {
        let inner = self.inner.lock().expect("events store poisoned");
        if !inner.events.contains_key(&event_id) {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        let empty = HashMap::new();
        let scores = inner.scores.get(&event_id).unwrap_or(&empty);
        let mut players = Vec::new();
        for card in inner.cards.get(&event_id).into_iter().flat_map(IndexMap::values) {
            let mut holes: Vec<HoleResult> = scores
                .iter()
                .filter(|((scorecard_id, _), _)| scorecard_id == &card.scorecard_id)
                .map(|((_, hole), score)| HoleResult {
                    hole: *hole,
                    gross: score.gross,
                    net: score.net,
                    stableford: score.stableford,
                    par: score.par,
                    updated_at: score.updated_at,
                })
                .collect();
            holes.sort_by_key(|result| result.hole);
            players.push(PlayerScores {
                scorecard_id: card.scorecard_id.clone(),
                name: card.name.clone(),
                holes,
            });
        }
        Ok(players)
    }
}

fn stored(write: ScoreWrite, revision: i64) -> HoleScore {
    HoleScore {
        gross: write.gross,
        net: write.net,
        stableford: write.stableford,
        par: write.par,
        strokes_received: write.strokes_received,
        fingerprint: write.fingerprint,
        revision,
        payload: write.payload,
        updated_at: OffsetDateTime::now_utc(),
    }
}

fn conflict(scorecard_id: &str, hole: u8, write: &ScoreWrite, current: &HoleScore) -> ServiceError {
    telemetry::emit("conflict.count", json!({ "scorecardId": scorecard_id, "hole": hole }));
    telemetry::emit(
        "score.conflict.stale_or_duplicate",
        json!({
            "scorecardId": scorecard_id,
            "hole": hole,
            "incomingRevision": write.revision,
            "existingRevision": current.revision,
            "fingerprint": write.fingerprint,
        }),
    );
    ServiceError::StaleScore {
        current_revision: Some(current.revision),
    }
}

fn allocate_code(taken: &HashMap<String, Uuid>) -> Result<String, ServiceError> {
    for _ in 0..CODE_ALLOCATION_ATTEMPTS {
        let code = codes::generate_code();
        if !taken.contains_key(&code) {
            return Ok(code);
        }
    }
    Err(ServiceError::Disabled("unable to allocate join code".into()))
}
