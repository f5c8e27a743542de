use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate as _;

use crate::{
    auth,
    dto::clips::ClipPublic,
    dto::moderation::{
        ActionRequest, ClipsFeedResponse, ModeratedClipDto, ModerationStateDto, QueueQuery,
        QueueResponse, ReportRequest, ReportResponse,
    },
    error::AppError,
    state::SharedState,
    store::moderation::{ModerationAction, Visibility},
    telemetry,
};

const FEED_LIMIT: usize = 100;

/// Routes handling reports, the admin queue and moderation actions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/clips/{clip_id}/report", post(report_clip))
        .route("/admin/moderation/queue", get(moderation_queue))
        .route("/admin/moderation/{clip_id}/action", post(apply_action))
        .route("/events/{event_id}/clips-feed", get(clips_feed))
}

/// File a report against a clip.
#[utoipa::path(
    post,
    path = "/clips/{clip_id}/report",
    tag = "moderation",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    request_body = ReportRequest,
    responses(
        (status = 201, description = "Report filed", body = ReportResponse),
        (status = 404, description = "Unknown clip"),
        (status = 429, description = "Too many reports from this address")
    )
)]
pub async fn report_clip(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReportRequest>,
) -> Result<Response, AppError> {
    auth::require_api_key(&state, &headers)?;
    payload.validate()?;
    let ip = auth::client_ip(&headers);
    if !state.report_limiter.allow(&ip) {
        return Err(AppError::TooManyRequests("too many reports".into()));
    }
    if state.clips().await.fetch(clip_id).is_none() {
        return Err(AppError::NotFound(format!("clip {clip_id}")));
    }
    let reporter = payload.reporter.or_else(|| auth::member_id(&headers));
    let report = state
        .moderation
        .record_report(clip_id, &payload.reason, payload.details, reporter);
    telemetry::emit(
        "clip.reported",
        json!({
            "clipId": clip_id,
            "reportId": report.id,
            "reason": report.reason,
        }),
    );
    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))).into_response())
}

/// Admin queue of moderation state, open-report clips by default.
#[utoipa::path(
    get,
    path = "/admin/moderation/queue",
    tag = "moderation",
    params(("status" = Option<String>, Query, description = "`open` (default) or `all`")),
    responses(
        (status = 200, description = "Queue entries, newest-updated first", body = QueueResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn moderation_queue(
    State(state): State<SharedState>,
    Query(query): Query<QueueQuery>,
    headers: HeaderMap,
) -> Result<Json<QueueResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let status = query.status.as_deref().unwrap_or("open");
    let items = state
        .moderation
        .queue(status)
        .into_iter()
        .map(ModerationStateDto::from)
        .collect();
    Ok(Json(QueueResponse { items }))
}

/// Apply a moderation action; any action resolves the clip's open reports.
#[utoipa::path(
    post,
    path = "/admin/moderation/{clip_id}/action",
    tag = "moderation",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "State after the action", body = ModerationStateDto),
        (status = 400, description = "Unknown action or visibility"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn apply_action(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ActionRequest>,
) -> Result<Json<ModerationStateDto>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let action = ModerationAction::parse(&payload.action)
        .ok_or_else(|| AppError::BadRequest(format!("unknown action: {}", payload.action)))?;
    let visibility = payload
        .visibility
        .as_deref()
        .map(|raw| {
            Visibility::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown visibility: {raw}")))
        })
        .transpose()?;

    let previous = state.moderation.state(clip_id);
    let performed_by = auth::member_id(&headers);
    let next = state
        .moderation
        .apply_action(clip_id, action, visibility, performed_by)?;

    // Telemetry fires only on real transitions, not replays of the state.
    match action {
        ModerationAction::Hide if !previous.hidden && next.hidden => {
            telemetry::emit("clip.moderation.hide", json!({ "clipId": clip_id }));
        }
        ModerationAction::Unhide if previous.hidden && !next.hidden => {
            telemetry::emit("clip.moderation.unhide", json!({ "clipId": clip_id }));
        }
        ModerationAction::SetVisibility if previous.visibility != next.visibility => {
            telemetry::emit(
                "clip.visibility.changed",
                json!({
                    "clipId": clip_id,
                    "from": previous.visibility.as_str(),
                    "to": next.visibility.as_str(),
                }),
            );
        }
        _ => {}
    }
    Ok(Json(next.into()))
}

/// Event clips joined with their moderation state, for the admin console.
#[utoipa::path(
    get,
    path = "/events/{event_id}/clips-feed",
    tag = "moderation",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Clips with moderation state", body = ClipsFeedResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn clips_feed(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ClipsFeedResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    state
        .events
        .get_event(event_id)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))?;

    let now = OffsetDateTime::now_utc();
    let items = state
        .clips()
        .await
        .list_ready(event_id, None, FEED_LIMIT, None)
        .iter()
        .map(|clip| {
            let moderation = state.moderation.state(clip.id);
            ModeratedClipDto {
                clip: ClipPublic::from_record(clip, &state.config.clips, &state.media, now),
                hidden: moderation.hidden,
                moderation_visibility: moderation.visibility.as_str().to_string(),
                open_reports: moderation.open_reports,
            }
        })
        .collect();
    Ok(Json(ClipsFeedResponse { items }))
}
