//! In-process transcode worker.
//!
//! Drains the job buffer and moves `transcode_clip` jobs to their terminal
//! clip status. Asset paths are deterministic per clip id; a real transcoder
//! behind the same repository contract would fill in real renditions.

use serde_json::json;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::jobs::{JobEntry, TRANSCODE_CLIP};
use crate::state::AppState;
use crate::telemetry;

/// Produced asset locations for one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeAssets {
    /// HLS master playlist path.
    pub hls_url: String,
    /// Progressive MP4 path, when the source already is one.
    pub mp4_url: Option<String>,
    /// Thumbnail path.
    pub thumb_url: String,
    /// Clip duration in milliseconds.
    pub duration_ms: u64,
}

/// Deterministic asset layout for `clip_id`. The duration is derived from
/// the clip id (8-16s) until a real transcoder probes the source.
pub fn assets_for(clip_id: Uuid, src: &str) -> TranscodeAssets {
    let mp4_url = src.ends_with(".mp4").then(|| src.to_string());
    TranscodeAssets {
        hls_url: format!("/media/clips/{clip_id}/master.m3u8"),
        mp4_url,
        thumb_url: format!("/media/clips/{clip_id}/thumb.jpg"),
        duration_ms: 8_000 + (clip_id.as_u128() % 8_000) as u64,
    }
}

fn validate_src(src: &str) -> Result<(), ServiceError> {
    let plausible = src.starts_with("http://")
        || src.starts_with("https://")
        || src.starts_with("s3://")
        || src.starts_with('/');
    if src.is_empty() || !plausible {
        return Err(ServiceError::InvalidInput(format!(
            "unsupported transcode source '{src}'"
        )));
    }
    Ok(())
}

/// Process one buffered job; failures mark the clip failed and propagate.
pub async fn process_job(state: &AppState, job: &JobEntry) -> Result<Uuid, ServiceError> {
    if job.name != TRANSCODE_CLIP {
        return Err(ServiceError::InvalidInput(format!(
            "unknown job '{}'",
            job.name
        )));
    }
    let clip_id = job.payload["clipId"]
        .as_str()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| ServiceError::InvalidInput("job payload missing clipId".into()))?;
    let src = job.payload["src"]
        .as_str()
        .ok_or_else(|| ServiceError::InvalidInput("job payload missing src".into()))?
        .to_string();

    let clips = state.clips().await;
    if clips.fetch(clip_id).is_none() {
        return Err(ServiceError::NotFound(format!("clip {clip_id} not found")));
    }

    if let Err(err) = validate_src(&src) {
        clips.mark_failed(clip_id, Some(err.to_string()));
        telemetry::emit(
            "clips.failed",
            json!({ "clipId": clip_id, "error": err.to_string() }),
        );
        return Err(err);
    }

    let assets = assets_for(clip_id, &src);
    clips.mark_ready(
        clip_id,
        &assets.hls_url,
        assets.mp4_url,
        Some(assets.thumb_url),
        Some(assets.duration_ms),
    );
    telemetry::emit(
        "clips.ready",
        json!({ "clipId": clip_id, "durationMs": assets.duration_ms }),
    );
    Ok(clip_id)
}

/// Drain and process every buffered job, returning how many succeeded.
pub async fn drain(state: &AppState) -> usize {
    let mut processed = 0;
    for job in state.jobs.drain() {
        match process_job(state, &job).await {
            Ok(_) => processed += 1,
            Err(err) => {
                tracing::warn!(job = %job.name, %err, "transcode job failed");
            }
        }
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use crate::store::clips::ClipStatus;

    async fn queued_clip(state: &AppState) -> Uuid {
        state
            .clips()
            .await
            .create_placeholder(Uuid::new_v4(), Uuid::new_v4(), Some(3), "fp", None)
    }

    #[tokio::test]
    async fn successful_job_marks_clip_ready_with_assets() {
        let state = test_state();
        let clip = queued_clip(&state).await;
        state.clips().await.mark_processing(clip, "https://up.example/raw.mp4");
        state.jobs.enqueue(
            TRANSCODE_CLIP,
            json!({ "clipId": clip.to_string(), "src": "https://up.example/raw.mp4" }),
        );

        assert_eq!(drain(&state).await, 1);
        let record = state.clips().await.fetch(clip).unwrap();
        assert_eq!(record.status, ClipStatus::Ready);
        assert_eq!(
            record.hls_url.as_deref(),
            Some(format!("/media/clips/{clip}/master.m3u8").as_str())
        );
        assert_eq!(record.mp4_url.as_deref(), Some("https://up.example/raw.mp4"));
        assert_eq!(
            record.thumb_url.as_deref(),
            Some(format!("/media/clips/{clip}/thumb.jpg").as_str())
        );
        let duration = record.duration_ms.expect("ready clip carries a duration");
        assert!((8_000..16_000).contains(&duration), "duration {duration}");
        // The same clip always transcodes to the same duration.
        assert_eq!(
            assets_for(clip, "https://up.example/raw.mp4").duration_ms,
            duration
        );
    }

    #[tokio::test]
    async fn bad_source_marks_clip_failed() {
        let state = test_state();
        let clip = queued_clip(&state).await;
        let job = JobEntry {
            name: TRANSCODE_CLIP.into(),
            payload: json!({ "clipId": clip.to_string(), "src": "not-a-uri" }),
        };

        let err = process_job(&state, &job).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        let record = state.clips().await.fetch(clip).unwrap();
        assert_eq!(record.status, ClipStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn unknown_clip_is_not_found() {
        let state = test_state();
        let job = JobEntry {
            name: TRANSCODE_CLIP.into(),
            payload: json!({ "clipId": Uuid::new_v4().to_string(), "src": "/uploads/x.mp4" }),
        };
        let err = process_job(&state, &job).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
