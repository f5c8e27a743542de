use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use crate::{
    auth,
    dto::feed::{HomeQuery, HomeResponse},
    error::AppError,
    services::feed_service,
    state::SharedState,
    telemetry,
};

/// Routes serving the cached cross-event home feed.
pub fn router() -> Router<SharedState> {
    Router::new().route("/feed/home", get(home))
}

/// The home feed: ranked public clips and running streams.
///
/// Serves a per-limit representation ETag; matching `If-None-Match`
/// conditional requests get a bodiless 304 carrying the same tag.
#[utoipa::path(
    get,
    path = "/feed/home",
    tag = "feed",
    params(("limit" = Option<usize>, Query, description = "Top shots to return, clamped to 5..=50")),
    responses(
        (status = 200, description = "Home feed snapshot", body = HomeResponse),
        (status = 304, description = "Representation unchanged")
    )
)]
pub async fn home(
    State(state): State<SharedState>,
    Query(query): Query<HomeQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    auth::require_api_key(&state, &headers)?;
    let limit = feed_service::clamp_limit(query.limit);
    telemetry::emit("feed.home.requested", json!({ "limit": limit }));

    let snapshot = feed_service::home_snapshot(&state).await;
    let (body, token) = snapshot.representation(limit);

    let mut response_headers = HeaderMap::new();
    let etag = HeaderValue::from_str(&format!("\"{token}\""))
        .map_err(|err| AppError::Internal(format!("etag header: {err}")))?;
    response_headers.insert(header::ETAG, etag);
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=60"),
    );
    response_headers.insert(header::VARY, HeaderValue::from_static("Accept"));
    response_headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());
    if feed_service::etag_matches(if_none_match, &token) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    telemetry::emit(
        "feed.home.served",
        json!({
            "limit": limit,
            "topCount": body.top_shots.len(),
            "liveCount": body.live.len(),
        }),
    );
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn conditional_request_round_trips_the_etag() {
        let state = test_state();

        let first = home(
            State(state.clone()),
            Query(HomeQuery { limit: Some(10) }),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let etag = first.headers().get(header::ETAG).unwrap().clone();
        assert_eq!(
            first.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=60"
        );

        let mut conditional = HeaderMap::new();
        conditional.insert(header::IF_NONE_MATCH, etag.clone());
        let second = home(
            State(state.clone()),
            Query(HomeQuery { limit: Some(10) }),
            conditional.clone(),
        )
        .await
        .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(second.headers().get(header::ETAG), Some(&etag));

        // A different limit is a different representation.
        let other_limit = home(
            State(state.clone()),
            Query(HomeQuery { limit: Some(20) }),
            conditional,
        )
        .await
        .unwrap();
        assert_eq!(other_limit.status(), StatusCode::OK);
    }
}
