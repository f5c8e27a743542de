use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;
use validator::Validate as _;

use crate::{
    auth,
    dto::clips::{
        ClipListQuery, ClipListResponse, ClipPublic, CompleteRequest, CompleteResponse,
        PresignRequest, PresignResponse, ReactRequest, ReactResponse,
    },
    error::AppError,
    jobs::TRANSCODE_CLIP,
    media,
    state::SharedState,
    store::moderation::{Viewer, Visibility},
    telemetry,
};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

/// Routes covering the clip upload, reaction and listing lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events/{event_id}/clips/presign", post(presign))
        .route("/events/{event_id}/clips", get(list_clips))
        .route("/clips/{clip_id}/complete", post(complete))
        .route("/clips/{clip_id}/react", post(react))
        .route("/clips/{clip_id}", get(get_clip))
}

/// Issue a presigned upload slot and its queued placeholder clip.
#[utoipa::path(
    post,
    path = "/events/{event_id}/clips/presign",
    tag = "clips",
    params(("event_id" = Uuid, Path, description = "Event identifier")),
    request_body = PresignRequest,
    responses(
        (status = 200, description = "Upload slot issued", body = PresignResponse),
        (status = 400, description = "Unsupported content type or visibility"),
        (status = 413, description = "Upload exceeds the size limit")
    )
)]
pub async fn presign(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<PresignRequest>,
) -> Result<Json<PresignResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    let member = auth::require_member(&headers)?;
    payload.validate()?;
    state
        .events
        .get_event(event_id)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))?;
    let player_id = Uuid::try_parse(&member)
        .map_err(|_| AppError::BadRequest("member id must be a uuid".into()))?;
    if let Some(visibility) = payload.visibility.as_deref() {
        Visibility::parse(visibility)
            .ok_or_else(|| AppError::BadRequest(format!("unknown visibility: {visibility}")))?;
    }

    let clips = state.clips().await;
    let clip_id = clips.create_placeholder(
        event_id,
        player_id,
        payload.hole,
        &payload.fingerprint,
        payload.visibility.clone(),
    );
    let slot = match media::presign_upload(
        &state.config.media,
        &state.config.clips,
        &event_id.to_string(),
        &clip_id.to_string(),
        &payload.content_type,
        payload.size_bytes,
    ) {
        Ok(slot) => slot,
        Err(err) => {
            // The placeholder must not linger as an uploadable slot.
            clips.mark_failed(clip_id, Some(err.to_string()));
            return Err(err.into());
        }
    };
    telemetry::emit(
        "clips.upload.requested",
        json!({
            "eventId": event_id,
            "clipId": clip_id,
            "sizeBytes": payload.size_bytes,
        }),
    );
    Ok(Json(PresignResponse {
        clip_id,
        url: slot.url,
        method: slot.method.to_string(),
        content_type: slot.content_type,
        expires_at: slot.expires_at,
    }))
}

/// Report an upload as complete, queueing the transcode job.
#[utoipa::path(
    post,
    path = "/clips/{clip_id}/complete",
    tag = "clips",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Transcode queued", body = CompleteResponse),
        (status = 404, description = "Unknown clip")
    )
)]
pub async fn complete(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    payload.validate()?;
    let clips = state.clips().await;
    if clips.fetch(clip_id).is_none() {
        return Err(AppError::NotFound(format!("clip {clip_id}")));
    }
    clips.mark_processing(clip_id, &payload.src_uri);
    state.jobs.enqueue(
        TRANSCODE_CLIP,
        json!({ "clipId": clip_id, "src": payload.src_uri }),
    );
    Ok(Json(CompleteResponse {
        id: clip_id,
        status: "processing".into(),
    }))
}

/// React to a clip; one reaction per member inside the rate-limit window.
#[utoipa::path(
    post,
    path = "/clips/{clip_id}/react",
    tag = "clips",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    request_body = ReactRequest,
    responses(
        (status = 200, description = "Reaction recorded", body = ReactResponse),
        (status = 404, description = "Unknown clip"),
        (status = 429, description = "Member reacted too recently")
    )
)]
pub async fn react(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReactRequest>,
) -> Result<Json<ReactResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    let member = auth::require_member(&headers)?;
    payload.validate()?;
    let result = state
        .clips()
        .await
        .add_reaction(clip_id, &member, &payload.emoji)
        .ok_or_else(|| AppError::NotFound(format!("clip {clip_id}")))?;
    if !result.accepted {
        return Err(AppError::TooManyRequests(
            "reaction rate limit: one per member per window".into(),
        ));
    }
    telemetry::emit(
        "clips.reaction",
        json!({ "clipId": clip_id, "memberId": member, "emoji": payload.emoji }),
    );
    Ok(Json(ReactResponse {
        ok: true,
        recent_count: result.recent_count,
    }))
}

fn record_visible(visibility: &str, viewer: Viewer) -> bool {
    match viewer {
        Viewer::Admin => true,
        Viewer::Member => visibility != "private",
        Viewer::Anonymous => visibility == "public",
    }
}

/// List ready clips of an event, filtered by the caller's viewer class.
#[utoipa::path(
    get,
    path = "/events/{event_id}/clips",
    tag = "clips",
    params(
        ("event_id" = Uuid, Path, description = "Event identifier"),
        ("after" = Option<String>, Query, description = "RFC 3339 lower bound"),
        ("limit" = Option<usize>, Query, description = "Maximum items")
    ),
    responses(
        (status = 200, description = "Ready clips, newest first", body = ClipListResponse),
        (status = 400, description = "Malformed `after` timestamp")
    )
)]
pub async fn list_clips(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<ClipListQuery>,
    headers: HeaderMap,
) -> Result<Json<ClipListResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    state
        .events
        .get_event(event_id)
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))?;
    let after = query
        .after
        .as_deref()
        .map(|raw| OffsetDateTime::parse(raw, &Rfc3339))
        .transpose()
        .map_err(|err| AppError::BadRequest(format!("invalid after timestamp: {err}")))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let viewer = auth::viewer(&headers);

    let now = OffsetDateTime::now_utc();
    let items = state
        .clips()
        .await
        .list_ready(event_id, after, limit, None)
        .iter()
        .filter(|clip| {
            record_visible(&clip.visibility, viewer)
                && state.moderation.visible_to(clip.id, viewer)
        })
        .map(|clip| ClipPublic::from_record(clip, &state.config.clips, &state.media, now))
        .collect();
    Ok(Json(ClipListResponse { items }))
}

/// Fetch one clip; hidden clips 404 for non-admins, restricted ones 403.
#[utoipa::path(
    get,
    path = "/clips/{clip_id}",
    tag = "clips",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    responses(
        (status = 200, description = "The clip", body = ClipPublic),
        (status = 403, description = "Visibility does not admit the caller"),
        (status = 404, description = "Unknown or hidden clip")
    )
)]
pub async fn get_clip(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ClipPublic>, AppError> {
    auth::require_api_key(&state, &headers)?;
    let viewer = auth::viewer(&headers);
    let clip = state
        .clips()
        .await
        .fetch(clip_id)
        .ok_or_else(|| AppError::NotFound(format!("clip {clip_id}")))?;
    // Hidden clips do not exist for non-admins.
    if viewer != Viewer::Admin && state.moderation.is_hidden(clip_id) {
        return Err(AppError::NotFound(format!("clip {clip_id}")));
    }
    if !record_visible(&clip.visibility, viewer)
        || !state.moderation.visible_to(clip_id, viewer)
    {
        return Err(AppError::Forbidden("clip visibility does not admit you".into()));
    }
    Ok(Json(ClipPublic::from_record(
        &clip,
        &state.config.clips,
        &state.media,
        OffsetDateTime::now_utc(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::http::HeaderValue;

    fn member_headers(member: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            auth::MEMBER_HEADER,
            HeaderValue::from_str(member).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn presign_then_complete_enqueues_a_transcode_job() {
        let state = test_state();
        let event = state.events.create_event("Club Night", None).unwrap();
        let member = Uuid::new_v4().simple().to_string();

        let slot = presign(
            State(state.clone()),
            Path(event.id),
            member_headers(&member),
            Json(PresignRequest {
                content_type: "video/mp4".into(),
                size_bytes: 1_000,
                hole: Some(7),
                fingerprint: "fp-1".into(),
                visibility: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(slot.method, "PUT");

        complete(
            State(state.clone()),
            Path(slot.clip_id),
            HeaderMap::new(),
            Json(CompleteRequest {
                src_uri: format!("/uploads/{}/{}.mp4", event.id, slot.clip_id),
            }),
        )
        .await
        .unwrap();

        let jobs = state.jobs.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, TRANSCODE_CLIP);
        assert_eq!(
            jobs[0].payload["clipId"].as_str(),
            Some(slot.clip_id.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn oversized_presign_is_rejected_and_poisons_the_placeholder() {
        let state = test_state();
        let event = state.events.create_event("Club Night", None).unwrap();
        let member = Uuid::new_v4().simple().to_string();

        let err = presign(
            State(state.clone()),
            Path(event.id),
            member_headers(&member),
            Json(PresignRequest {
                content_type: "video/mp4".into(),
                size_bytes: state.config.clips.max_upload_bytes + 1,
                hole: None,
                fingerprint: "fp-2".into(),
                visibility: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn second_reaction_inside_the_window_is_rate_limited() {
        let state = test_state();
        let clip = state.clips().await.create_placeholder(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(3),
            "fp",
            None,
        );

        let first = react(
            State(state.clone()),
            Path(clip),
            member_headers("m1"),
            Json(ReactRequest { emoji: "🔥".into() }),
        )
        .await
        .unwrap();
        assert!(first.ok);

        let err = react(
            State(state.clone()),
            Path(clip),
            member_headers("m1"),
            Json(ReactRequest { emoji: "🔥".into() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_)));
    }

    #[tokio::test]
    async fn anonymous_listing_shows_public_clips_only() {
        let state = test_state();
        let event = state.events.create_event("Club Night", None).unwrap();
        let clips = state.clips().await;
        let public =
            clips.create_placeholder(event.id, Uuid::new_v4(), None, "fp", Some("public".into()));
        clips.mark_ready(public, "/media/p/master.m3u8", None, None, None);
        let scoped = clips.create_placeholder(event.id, Uuid::new_v4(), None, "fp", None);
        clips.mark_ready(scoped, "/media/s/master.m3u8", None, None, None);

        let listed = list_clips(
            State(state.clone()),
            Path(event.id),
            Query(ClipListQuery::default()),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        let ids: Vec<Uuid> = listed.items.iter().map(|clip| clip.id).collect();
        assert_eq!(ids, vec![public]);

        let member_view = list_clips(
            State(state.clone()),
            Path(event.id),
            Query(ClipListQuery::default()),
            member_headers("m1"),
        )
        .await
        .unwrap();
        assert_eq!(member_view.items.len(), 2);
    }
}
