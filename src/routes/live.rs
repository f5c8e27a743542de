use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate as _;

use crate::{
    auth,
    dto::format_timestamp_opt,
    dto::live::{
        ExchangeInviteRequest, ExchangeInviteResponse, LiveStatusQuery, LiveStatusResponse,
        MintTokenRequest, MintTokenResponse, StartLiveRequest, StartLiveResponse,
        StopLiveResponse, ViewerLinkResponse,
    },
    error::{AppError, ServiceError},
    state::SharedState,
    telemetry,
};

const DEFAULT_TOKEN_TTL_S: i64 = 900;
const INVITE_TTL_S: i64 = 900;

/// Routes running the live stream lifecycle and viewer access tokens.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events/{event_id}/live/start", post(start_live))
        .route("/events/{event_id}/live/stop", post(stop_live))
        .route("/events/{event_id}/live/status", get(live_status))
        .route("/events/{event_id}/live/token", post(mint_token))
        .route("/events/{event_id}/live/viewer_link", get(viewer_link))
        .route("/events/{event_id}/live/exchange_invite", post(exchange_invite))
}

/// Start the event's stream; only one may run at a time.
#[utoipa::path(
    post,
    path = "/events/{event_id}/live/start",
    tag = "live",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = StartLiveRequest,
    responses(
        (status = 200, description = "Stream running", body = StartLiveResponse),
        (status = 409, description = "A stream is already running"),
        (status = 503, description = "Non-mock source without a configured ingest")
    )
)]
pub async fn start_live(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StartLiveRequest>,
) -> Result<Json<StartLiveResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    state
        .events
        .get_event(event_id)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))?;
    let source = payload.source.as_deref().unwrap_or("mock");
    let status = state.live.start(event_id, source)?;
    telemetry::emit(
        "live.started",
        json!({
            "eventId": event_id,
            "source": source,
            "hlsPath": status.hls_path,
        }),
    );
    Ok(Json(StartLiveResponse {
        running: true,
        hls_path: status.hls_path.unwrap_or_default(),
        started_at: format_timestamp_opt(status.started_at),
    }))
}

/// Stop the event's stream; idempotent.
#[utoipa::path(
    post,
    path = "/events/{event_id}/live/stop",
    tag = "live",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Stop outcome", body = StopLiveResponse)
    )
)]
pub async fn stop_live(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<StopLiveResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let stopped = state.live.stop(event_id);
    if stopped {
        telemetry::emit("live.stopped", json!({ "eventId": event_id }));
    }
    Ok(Json(StopLiveResponse { stopped }))
}

/// Stream status; a valid viewer token reveals the manifest path and
/// registers the viewer.
#[utoipa::path(
    get,
    path = "/events/{event_id}/live/status",
    tag = "live",
    params(
        ("event_id" = Uuid, Path, description = "Event identifier"),
        ("token" = Option<String>, Query, description = "Viewer token")
    ),
    responses(
        (status = 200, description = "Stream status", body = LiveStatusResponse)
    )
)]
pub async fn live_status(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<LiveStatusQuery>,
    headers: HeaderMap,
) -> Result<Json<LiveStatusResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    // An unverifiable token (including signing disabled) is just invalid here.
    let viewer_id = query.token.as_deref().and_then(|token| {
        state
            .tokens
            .verify_viewer_token(&event_id.to_string(), token)
            .ok()
            .flatten()
    });
    if let Some(viewer_id) = &viewer_id {
        state.live.register_viewer(event_id, viewer_id);
    }
    let status = state.live.status(event_id);
    telemetry::emit(
        "live.status",
        json!({
            "eventId": event_id,
            "running": status.running,
            "tokenValid": viewer_id.is_some(),
            "viewerId": viewer_id,
        }),
    );
    Ok(Json(LiveStatusResponse::from_status(
        status,
        viewer_id.is_some(),
    )))
}

/// Mint a viewer token for the running stream.
#[utoipa::path(
    post,
    path = "/events/{event_id}/live/token",
    tag = "live",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = MintTokenRequest,
    responses(
        (status = 200, description = "Token minted", body = MintTokenResponse),
        (status = 409, description = "No stream running"),
        (status = 503, description = "Token signing disabled")
    )
)]
pub async fn mint_token(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<MintTokenRequest>,
) -> Result<Json<MintTokenResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    if !state.live.status(event_id).running {
        return Err(AppError::Conflict("live stream not running".into()));
    }
    let ttl_s = payload.ttl.unwrap_or(DEFAULT_TOKEN_TTL_S).max(1);
    let minted = state.tokens.mint_viewer_token(&event_id.to_string(), ttl_s)?;
    telemetry::emit(
        "live.token.minted",
        json!({
            "eventId": event_id,
            "viewerId": minted.viewer_id,
            "exp": minted.exp,
            "ttlS": ttl_s,
        }),
    );
    Ok(Json(MintTokenResponse {
        token: minted.token,
        exp: minted.exp,
        viewer_id: minted.viewer_id,
    }))
}

/// Shareable web link carrying a short-lived invite for the stream.
#[utoipa::path(
    get,
    path = "/events/{event_id}/live/viewer_link",
    tag = "live",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Viewer link", body = ViewerLinkResponse),
        (status = 409, description = "No stream running"),
        (status = 503, description = "Token signing disabled")
    )
)]
pub async fn viewer_link(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ViewerLinkResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    if !state.live.status(event_id).running {
        return Err(AppError::Conflict("live stream not running".into()));
    }
    let invite = state.tokens.mint_invite(&event_id.to_string(), INVITE_TTL_S)?;
    telemetry::emit(
        "live.invite.minted",
        json!({ "eventId": event_id, "exp": invite.exp }),
    );
    let url = format!(
        "{}/events/{event_id}/live-view?invite={}",
        state.config.web_base_url,
        percent_encode(&invite.invite),
    );
    telemetry::emit("live.viewer_link.copied", json!({ "eventId": event_id }));
    Ok(Json(ViewerLinkResponse { url }))
}

/// Exchange an invite for a fresh viewer token bound to this event.
#[utoipa::path(
    post,
    path = "/events/{event_id}/live/exchange_invite",
    tag = "live",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = ExchangeInviteRequest,
    responses(
        (status = 200, description = "Token minted", body = ExchangeInviteResponse),
        (status = 400, description = "Invalid, expired or mismatched invite"),
        (status = 429, description = "Too many exchange attempts")
    )
)]
pub async fn exchange_invite(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ExchangeInviteRequest>,
) -> Result<Json<ExchangeInviteResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    payload.validate()?;
    let ip = auth::client_ip(&headers);
    if !state.exchange_limiter.allow(&format!("{event_id}:{ip}")) {
        return Err(AppError::TooManyRequests("too many invite exchanges".into()));
    }

    match state.tokens.exchange_invite(&payload.invite) {
        Ok(exchanged) => {
            if exchanged.event_id != event_id.to_string() {
                telemetry::emit(
                    "live.invite.exchange",
                    json!({ "eventId": event_id, "ok": false, "reason": "invite_event_mismatch" }),
                );
                return Err(AppError::BadRequest("invite does not match event".into()));
            }
            telemetry::emit(
                "live.invite.exchange",
                json!({
                    "eventId": event_id,
                    "ok": true,
                    "viewerId": exchanged.token.viewer_id,
                }),
            );
            Ok(Json(ExchangeInviteResponse {
                token: exchanged.token.token,
                exp: exchanged.token.exp,
            }))
        }
        Err(err) => {
            let reason = match &err {
                ServiceError::Disabled(_) => "signing_disabled",
                _ => "invalid_invite",
            };
            telemetry::emit(
                "live.invite.exchange",
                json!({ "eventId": event_id, "ok": false, "reason": reason }),
            );
            Err(err.into())
        }
    }
}

/// Percent-encode for a query value, keeping URI-unreserved bytes.
fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => {
                out.push_str(&format!("%{other:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::http::HeaderValue;

    fn admin_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(auth::ROLE_HEADER, HeaderValue::from_static("admin"));
        headers
    }

    async fn running_event(state: &SharedState) -> Uuid {
        let event = state.events.create_event("Club Night", None).unwrap();
        start_live(
            State(state.clone()),
            Path(event.id),
            admin_headers(),
            Json(StartLiveRequest::default()),
        )
        .await
        .unwrap();
        event.id
    }

    #[tokio::test]
    async fn token_minting_requires_a_running_stream() {
        let state = test_state();
        let event = state.events.create_event("Club Night", None).unwrap();

        let err = mint_token(
            State(state.clone()),
            Path(event.id),
            admin_headers(),
            Json(MintTokenRequest::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn status_reveals_the_path_only_with_a_valid_token() {
        let state = test_state();
        let event = running_event(&state).await;

        let anonymous = live_status(
            State(state.clone()),
            Path(event),
            Query(LiveStatusQuery::default()),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert!(anonymous.running);
        assert!(anonymous.hls_path.is_none());

        let minted = mint_token(
            State(state.clone()),
            Path(event),
            admin_headers(),
            Json(MintTokenRequest { ttl: Some(60) }),
        )
        .await
        .unwrap();
        let verified = live_status(
            State(state.clone()),
            Path(event),
            Query(LiveStatusQuery {
                token: Some(minted.token.clone()),
            }),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert!(verified.hls_path.is_some());
        // The verified viewer is now counted.
        assert_eq!(verified.viewers, 1);
    }

    #[tokio::test]
    async fn invite_exchange_rejects_other_events() {
        let state = test_state();
        let event = running_event(&state).await;
        let other = state.events.create_event("Other Night", None).unwrap();
        let invite = state
            .tokens
            .mint_invite(&event.to_string(), 300)
            .unwrap();

        let err = exchange_invite(
            State(state.clone()),
            Path(other.id),
            HeaderMap::new(),
            Json(ExchangeInviteRequest {
                invite: invite.invite.clone(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let exchanged = exchange_invite(
            State(state.clone()),
            Path(event),
            HeaderMap::new(),
            Json(ExchangeInviteRequest {
                invite: invite.invite,
            }),
        )
        .await
        .unwrap();
        assert!(
            state
                .tokens
                .verify_viewer_token(&event.to_string(), &exchanged.token)
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn viewer_link_embeds_an_exchangeable_invite() {
        let state = test_state();
        let event = running_event(&state).await;
        let link = viewer_link(State(state.clone()), Path(event), admin_headers())
            .await
            .unwrap();
        let (_, invite) = link.url.split_once("invite=").unwrap();
        let exchanged = state.tokens.exchange_invite(invite).unwrap();
        assert_eq!(exchanged.event_id, event.to_string());
    }
}
