use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate as _;

use crate::{
    auth, codes,
    dto::events::{
        BoardQuery, BoardResponse, CodeRegenerateResponse, CreateEventRequest,
        CreateEventResponse, HostStateResponse, JoinRequest, JoinResponse, PlayersResponse,
        RegisterPlayersRequest, RegisterPlayersResponse, ScoreRequest, ScoreResponse,
        SettingsRequest, SettingsResponse, StatusRequest, StatusResponse,
    },
    error::AppError,
    media,
    state::{ScoreReplay, SharedState},
    store::board::build_board,
    store::events::{EventStatus, ScoreWrite},
    telemetry,
};

/// Routes handling events, membership, scoring and the leaderboard.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events", post(create_event))
        .route("/join/{code}", post(join_event))
        .route("/events/{event_id}/players", post(register_players).get(list_players))
        .route("/events/{event_id}/score", post(submit_score))
        .route("/events/{event_id}/board", get(get_board))
        .route("/events/{event_id}/settings", patch(update_settings))
        .route("/events/{event_id}/status", post(set_status))
        .route("/events/{event_id}/code/regenerate", post(regenerate_code))
        .route("/events/{event_id}/host", get(host_state))
}

fn join_url(state: &SharedState, code: &str) -> String {
    format!("{}/join/{code}", state.config.web_base_url)
}

/// Create an event with a fresh join code.
#[utoipa::path(
    post,
    path = "/events",
    tag = "events",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event created", body = CreateEventResponse)
    )
)]
pub async fn create_event(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    auth::require_api_key(&state, &headers)?;
    payload.validate()?;
    let event = state.events.create_event(&payload.name, payload.emoji)?;
    telemetry::emit(
        "events.created",
        json!({ "eventId": event.id, "code": event.code }),
    );
    let join_url = join_url(&state, &event.code);
    let response = CreateEventResponse {
        id: event.id,
        code: event.code,
        qr_svg: media::qr_svg_placeholder(&join_url),
        join_url,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Join an event by code, registering the caller as a spectator.
#[utoipa::path(
    post,
    path = "/join/{code}",
    tag = "events",
    params(("code" = String, Path, description = "Join code to redeem")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined", body = JoinResponse),
        (status = 400, description = "Malformed code"),
        (status = 404, description = "Code does not resolve")
    )
)]
pub async fn join_event(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    let code = code.trim().to_uppercase();
    if !codes::validate_code(&code) {
        return Err(AppError::BadRequest("invalid join code".into()));
    }
    let event_id = state
        .events
        .resolve_by_code(&code)
        .ok_or_else(|| AppError::NotFound(format!("no event for code {code}")))?;
    let member_id = Uuid::new_v4().simple().to_string();
    state.events.register_member(
        event_id,
        &member_id,
        crate::store::events::MemberRole::Spectator,
        payload.name,
    )?;
    telemetry::emit(
        "events.join",
        json!({ "eventId": event_id, "memberId": member_id }),
    );
    Ok(Json(JoinResponse {
        event_id,
        member_id,
        role: "spectator".into(),
    }))
}

/// Accept a score write under the fingerprint+revision protocol.
///
/// An `x-client-req-id` header makes the write replayable: a retry with the
/// same id returns the recorded response instead of re-running the upsert.
#[utoipa::path(
    post,
    path = "/events/{event_id}/score",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = ScoreRequest,
    responses(
        (status = 200, description = "Score replaced or replayed", body = ScoreResponse),
        (status = 201, description = "First write for the hole", body = ScoreResponse),
        (status = 409, description = "Stale or duplicate revision")
    )
)]
pub async fn submit_score(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ScoreRequest>,
) -> Result<Response, AppError> {
    auth::require_api_key(&state, &headers)?;
    payload.validate()?;

    let req_id = auth::client_req_id(&headers);
    if let Some(req_id) = &req_id {
        if let Some(replay) = state.score_replays.get(&(event_id, req_id.clone())) {
            let status =
                StatusCode::from_u16(replay.status).unwrap_or(StatusCode::OK);
            return Ok((status, Json(replay.body.clone())).into_response());
        }
    }

    let write = ScoreWrite {
        gross: payload.gross,
        net: payload.net,
        stableford: payload.stableford,
        par: payload.par,
        strokes_received: payload.strokes_received,
        fingerprint: payload.fingerprint.clone(),
        revision: payload.revision,
        payload: payload.normalized_payload(),
    };
    let outcome =
        state
            .events
            .upsert_score(event_id, &payload.scorecard_id, payload.hole, write)?;

    let response = ScoreResponse {
        ok: true,
        idempotent: outcome.idempotent,
        revision: outcome.revision,
    };
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    if let Some(req_id) = req_id {
        let body = serde_json::to_value(&response)
            .map_err(|err| AppError::Internal(format!("serializing score response: {err}")))?;
        state.score_replays.insert(
            (event_id, req_id),
            ScoreReplay {
                status: status.as_u16(),
                body,
            },
        );
    }
    Ok((status, Json(response)).into_response())
}

/// Register scorecards on an event.
#[utoipa::path(
    post,
    path = "/events/{event_id}/players",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = RegisterPlayersRequest,
    responses(
        (status = 200, description = "Scorecards registered", body = RegisterPlayersResponse),
        (status = 400, description = "Empty batch"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn register_players(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<RegisterPlayersRequest>,
) -> Result<Json<RegisterPlayersResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    payload.validate()?;
    let cards = payload.players.into_iter().map(Into::into).collect();
    let registered = state.events.register_scorecards(event_id, cards)?;
    Ok(Json(RegisterPlayersResponse { registered }))
}

/// List registered scorecards in registration order.
#[utoipa::path(
    get,
    path = "/events/{event_id}/players",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Registered players", body = PlayersResponse)
    )
)]
pub async fn list_players(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<PlayersResponse>, AppError> {
    let players = state
        .events
        .list_scorecards(event_id)?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(PlayersResponse { players }))
}

/// Build the leaderboard under the event's format or an override.
#[utoipa::path(
    get,
    path = "/events/{event_id}/board",
    tag = "events",
    params(
        ("event_id" = Uuid, Path, description = "Event identifier"),
        ("format" = Option<String>, Query, description = "Board format override")
    ),
    responses(
        (status = 200, description = "Sorted leaderboard", body = BoardResponse)
    )
)]
pub async fn get_board(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardResponse>, AppError> {
    let event = state
        .events
        .get_event(event_id)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))?;
    let format = query.format.unwrap_or(event.settings.gross_net);
    let players = state.events.board_input(event_id)?;
    Ok(Json(build_board(&format, players).into()))
}

/// Replace event settings with a patch resolved over defaults.
#[utoipa::path(
    patch,
    path = "/events/{event_id}/settings",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = SettingsRequest,
    responses(
        (status = 200, description = "Settings in effect", body = SettingsResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let settings = state.events.update_settings(event_id, payload.into())?;
    telemetry::emit(
        "events.host.action",
        json!({ "eventId": event_id, "action": "settings" }),
    );
    Ok(Json(settings.into()))
}

/// Move the event through its lifecycle.
#[utoipa::path(
    post,
    path = "/events/{event_id}/status",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status applied", body = StatusResponse),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn set_status(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let next = EventStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status: {}", payload.status)))?;
    let status = state.events.set_status(event_id, next)?;
    telemetry::emit(
        "events.host.action",
        json!({ "eventId": event_id, "action": status.as_str() }),
    );
    Ok(Json(StatusResponse {
        id: event_id,
        status: status.as_str().into(),
    }))
}

/// Replace the join code; the old one stops resolving atomically.
#[utoipa::path(
    post,
    path = "/events/{event_id}/code/regenerate",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "New code issued", body = CodeRegenerateResponse),
        (status = 503, description = "Unable to allocate a unique code")
    )
)]
pub async fn regenerate_code(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<CodeRegenerateResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let code = state.events.regenerate_code(event_id)?;
    telemetry::emit(
        "events.host.action",
        json!({ "eventId": event_id, "action": "code_regenerate" }),
    );
    let join_url = join_url(&state, &code);
    Ok(Json(CodeRegenerateResponse {
        code,
        qr_svg: media::qr_svg_placeholder(&join_url),
        join_url,
    }))
}

/// Host console snapshot of the event.
#[utoipa::path(
    get,
    path = "/events/{event_id}/host",
    tag = "events",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Host state", body = HostStateResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn host_state(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<HostStateResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let event = state
        .events
        .get_event(event_id)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))?;
    let members = state.events.member_count(event_id);
    let join_url = join_url(&state, &event.code);
    let qr_svg = media::qr_svg_placeholder(&join_url);
    Ok(Json(HostStateResponse::from_event(
        event, join_url, qr_svg, members,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::http::HeaderValue;

    fn score(scorecard: &str, hole: u8, gross: i64, fingerprint: &str, revision: i64) -> ScoreRequest {
        ScoreRequest {
            scorecard_id: scorecard.into(),
            hole,
            gross,
            net: None,
            stableford: None,
            par: None,
            strokes_received: None,
            fingerprint: Some(fingerprint.into()),
            revision: Some(revision),
        }
    }

    fn register_card(state: &SharedState, event_id: Uuid, scorecard: &str) {
        state
            .events
            .register_scorecards(
                event_id,
                vec![crate::store::events::ScorecardRecord {
                    scorecard_id: scorecard.into(),
                    name: "Ada".into(),
                    hcp_index: None,
                    playing_handicap: None,
                }],
            )
            .unwrap();
    }

    fn req_id_headers(req_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            auth::CLIENT_REQ_ID_HEADER,
            HeaderValue::from_str(req_id).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn join_accepts_lowercase_codes_and_rejects_malformed_ones() {
        let state = test_state();
        let event = state.events.create_event("Saturday Skins", None).unwrap();

        let joined = join_event(
            State(state.clone()),
            Path(event.code.to_lowercase()),
            HeaderMap::new(),
            Json(JoinRequest { name: Some("Ada".into()) }),
        )
        .await
        .unwrap();
        assert_eq!(joined.event_id, event.id);
        assert_eq!(joined.role, "spectator");

        let err = join_event(
            State(state.clone()),
            Path("NOPE".into()),
            HeaderMap::new(),
            Json(JoinRequest::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn score_replay_returns_the_recorded_response() {
        let state = test_state();
        let event = state.events.create_event("Saturday Skins", None).unwrap();
        register_card(&state, event.id, "sc-1");

        let first = submit_score(
            State(state.clone()),
            Path(event.id),
            req_id_headers("req-1"),
            Json(score("sc-1", 4, 5, "device-a", 1)),
        )
        .await
        .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        // A retry under the same request id replays the stored 201.
        let replay = submit_score(
            State(state.clone()),
            Path(event.id),
            req_id_headers("req-1"),
            Json(score("sc-1", 4, 5, "device-a", 1)),
        )
        .await
        .unwrap();
        assert_eq!(replay.status(), StatusCode::CREATED);

        // A different device racing on the same revision loses with 409.
        let conflict = submit_score(
            State(state.clone()),
            Path(event.id),
            req_id_headers("req-2"),
            Json(score("sc-1", 4, 6, "device-b", 1)),
        )
        .await
        .unwrap_err();
        assert!(matches!(conflict, AppError::StaleScore { .. }));
    }

    #[tokio::test]
    async fn status_transitions_are_validated() {
        let state = test_state();
        let event = state.events.create_event("Saturday Skins", None).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(auth::ROLE_HEADER, HeaderValue::from_static("admin"));

        let live = set_status(
            State(state.clone()),
            Path(event.id),
            headers.clone(),
            Json(StatusRequest { status: "live".into() }),
        )
        .await
        .unwrap();
        assert_eq!(live.status, "live");

        let err = set_status(
            State(state.clone()),
            Path(event.id),
            headers,
            Json(StatusRequest { status: "pending".into() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
