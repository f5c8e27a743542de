use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth,
    dto::commentary::{
        CommentaryDto, CommentaryListQuery, CommentaryListResponse, GenerateCommentaryResponse,
        PlayTtsResponse,
    },
    error::AppError,
    services::commentary_service,
    state::SharedState,
    store::commentary::CommentaryStatus,
    telemetry,
};

/// Routes running and inspecting the AI commentary queue.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events/clips/{clip_id}/commentary", post(generate))
        .route("/admin/commentary/{event_id}", get(list_for_event))
        .route("/admin/commentary/clip/{clip_id}", get(get_entry))
        .route("/admin/commentary/clip/{clip_id}/play-tts", post(play_tts))
}

/// Generate commentary for a clip; blocked on tournament-safe events.
#[utoipa::path(
    post,
    path = "/events/clips/{clip_id}/commentary",
    tag = "commentary",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    responses(
        (status = 200, description = "Commentary persisted", body = GenerateCommentaryResponse),
        (status = 404, description = "Unknown clip"),
        (status = 423, description = "Event is tournament-safe"),
        (status = 503, description = "LLM provider disabled")
    )
)]
pub async fn generate(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<GenerateCommentaryResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let result = commentary_service::generate_commentary(&state, clip_id).await?;
    Ok(Json(result.into()))
}

/// Commentary queue entries for one event.
#[utoipa::path(
    get,
    path = "/admin/commentary/{event_id}",
    tag = "commentary",
    params(
        ("event_id" = Uuid, Path, description = "Event identifier"),
        ("status" = Option<String>, Query, description = "Status filter")
    ),
    responses(
        (status = 200, description = "Entries, newest first", body = CommentaryListResponse),
        (status = 400, description = "Unknown status filter"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_for_event(
    State(state): State<SharedState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<CommentaryListQuery>,
    headers: HeaderMap,
) -> Result<Json<CommentaryListResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            CommentaryStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown status: {raw}")))
        })
        .transpose()?;
    let items = state
        .commentary
        .list_for_event(event_id, status)
        .into_iter()
        .map(CommentaryDto::from)
        .collect();
    Ok(Json(CommentaryListResponse { items }))
}

/// Commentary queue entry for one clip.
#[utoipa::path(
    get,
    path = "/admin/commentary/clip/{clip_id}",
    tag = "commentary",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    responses(
        (status = 200, description = "The entry", body = CommentaryDto),
        (status = 404, description = "No commentary for this clip")
    )
)]
pub async fn get_entry(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<CommentaryDto>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let record = state
        .commentary
        .get(clip_id)
        .ok_or_else(|| AppError::NotFound(format!("no commentary for clip {clip_id}")))?;
    Ok(Json(record.into()))
}

/// Acknowledge TTS playback for a clip's commentary.
#[utoipa::path(
    post,
    path = "/admin/commentary/clip/{clip_id}/play-tts",
    tag = "commentary",
    params(("clip_id" = Uuid, Path, description = "Clip identifier")),
    responses(
        (status = 200, description = "Audio URL to play", body = PlayTtsResponse),
        (status = 404, description = "No synthesised audio for this clip")
    )
)]
pub async fn play_tts(
    State(state): State<SharedState>,
    Path(clip_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<PlayTtsResponse>, AppError> {
    auth::require_api_key(&state, &headers)?;
    auth::require_admin(&headers)?;
    let record = state
        .commentary
        .get(clip_id)
        .ok_or_else(|| AppError::NotFound(format!("no commentary for clip {clip_id}")))?;
    let tts_url = record
        .tts_url
        .ok_or_else(|| AppError::NotFound(format!("no TTS audio for clip {clip_id}")))?;
    telemetry::emit(
        "clip.commentary.play_tts",
        json!({ "eventId": record.event_id, "clipId": clip_id }),
    );
    Ok(Json(PlayTtsResponse { clip_id, tts_url }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use crate::store::commentary::CommentaryUpdate;
    use axum::http::HeaderValue;

    fn admin_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(auth::ROLE_HEADER, HeaderValue::from_static("admin"));
        headers
    }

    #[tokio::test]
    async fn listing_filters_by_status() {
        let state = test_state();
        let event = Uuid::new_v4();
        state.commentary.upsert(
            Uuid::new_v4(),
            event,
            CommentaryStatus::Ready,
            CommentaryUpdate::default(),
        );
        state.commentary.upsert(
            Uuid::new_v4(),
            event,
            CommentaryStatus::Failed,
            CommentaryUpdate::default(),
        );

        let all = list_for_event(
            State(state.clone()),
            Path(event),
            Query(CommentaryListQuery::default()),
            admin_headers(),
        )
        .await
        .unwrap();
        assert_eq!(all.items.len(), 2);

        let ready = list_for_event(
            State(state.clone()),
            Path(event),
            Query(CommentaryListQuery {
                status: Some("ready".into()),
            }),
            admin_headers(),
        )
        .await
        .unwrap();
        assert_eq!(ready.items.len(), 1);
        assert_eq!(ready.items[0].status, "ready");

        let err = list_for_event(
            State(state.clone()),
            Path(event),
            Query(CommentaryListQuery {
                status: Some("bogus".into()),
            }),
            admin_headers(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn play_tts_requires_synthesised_audio() {
        let state = test_state();
        let clip = Uuid::new_v4();
        state.commentary.upsert(
            clip,
            Uuid::new_v4(),
            CommentaryStatus::Ready,
            CommentaryUpdate {
                title: Some("Birdie".into()),
                summary: Some("One putt.".into()),
                ..CommentaryUpdate::default()
            },
        );

        let err = play_tts(State(state.clone()), Path(clip), admin_headers())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        state.commentary.upsert(
            clip,
            Uuid::new_v4(),
            CommentaryStatus::Ready,
            CommentaryUpdate {
                tts_url: Some("/media/tts/clip.mp3".into()),
                ..CommentaryUpdate::default()
            },
        );
        let played = play_tts(State(state.clone()), Path(clip), admin_headers())
            .await
            .unwrap();
        assert_eq!(played.tts_url, "/media/tts/clip.mp3");
    }
}
