//! AI commentary pipeline behind the tournament-safety interlock.
//!
//! A request transitions the queue entry queued → running → ready/failed,
//! or straight to blocked_safe when the event is flagged safe, in which
//! case no LLM call is made. LLM and TTS calls happen outside every store
//! lock; the queue row is re-upserted after the network round trip.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::ServiceError;
use crate::state::SharedState;
use crate::store::board::{Board, build_board};
use crate::store::clips::ClipRecord;
use crate::store::commentary::{CommentaryStatus, CommentaryUpdate};
use crate::store::events::EventRecord;
use crate::telemetry;

const TITLE_LIMIT: usize = 60;
const SUMMARY_LIMIT: usize = 200;
const LLM_TIMEOUT: Duration = Duration::from_secs(30);
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Title and summary produced by the LLM.
#[derive(Debug, Clone)]
pub struct LlmCommentary {
    /// Clip headline.
    pub title: String,
    /// Short factual recap.
    pub summary: String,
}

/// Abstraction over the commentary LLM provider.
pub trait LlmClient: Send + Sync {
    /// Generate commentary for the given prompt.
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<LlmCommentary, ServiceError>>;
}

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    /// Build a client; the configuration is validated per call so a
    /// misconfigured process still boots.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }
}

impl LlmClient for OpenAiClient {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<LlmCommentary, ServiceError>> {
        let http = self.http.clone();
        let config = self.config.clone();
        Box::pin(async move {
            if !config.enabled {
                return Err(ServiceError::Disabled("LLM provider disabled".into()));
            }
            if config.provider != "openai" {
                return Err(ServiceError::Disabled(format!(
                    "unsupported LLM provider: {}",
                    config.provider
                )));
            }
            let api_key = config.api_key.as_deref().ok_or_else(|| {
                ServiceError::Disabled("missing OPENAI_API_KEY for LLM call".into())
            })?;

            let system_prompt = concat!(
                "You are an AI golf commentator. Return compact JSON: ",
                "{\"title\": str, \"summary\": str}. Keep the response factual ",
                "and under the requested character limits."
            );
            let payload = json!({
                "model": config.model,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": prompt },
                ],
                "temperature": 0.2,
                "max_tokens": 400,
            });

            let response = http
                .post(OPENAI_CHAT_URL)
                .bearer_auth(api_key)
                .json(&payload)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| ServiceError::Internal(format!("LLM request failed: {err}")))?;
            let data: Value = response
                .json()
                .await
                .map_err(|err| ServiceError::Internal(format!("LLM response unreadable: {err}")))?;

            let message = data["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default();
            let parsed: Value = serde_json::from_str(message)
                .map_err(|_| ServiceError::Internal("invalid LLM response".into()))?;
            let title = parsed.get("title").and_then(Value::as_str);
            let summary = parsed.get("summary").and_then(Value::as_str);
            match (title, summary) {
                (Some(title), Some(summary)) => Ok(LlmCommentary {
                    title: title.trim().to_string(),
                    summary: summary.trim().to_string(),
                }),
                _ => Err(ServiceError::Internal(
                    "LLM response missing required fields".into(),
                )),
            }
        })
    }
}

/// Result of a successful generation.
#[derive(Debug, Clone)]
pub struct CommentaryResult {
    /// Clip the commentary was generated for.
    pub clip_id: Uuid,
    /// Persisted title.
    pub title: String,
    /// Persisted summary.
    pub summary: String,
    /// TTS audio URL when synthesised.
    pub tts_url: Option<String>,
}

/// Build the factual prompt from clip, event and leaderboard context.
pub fn build_prompt(clip: &ClipRecord, event: &EventRecord, board: &Board, player: &str) -> String {
    let mut lines = vec![
        "You are an impartial golf commentator describing a highlight clip.".to_string(),
        "Respond only with factual spectator commentary and avoid giving advice.".to_string(),
        "Output JSON with keys 'title' and 'summary' in the requested language.".to_string(),
        "Language: en".to_string(),
        format!("Event: {}", event.name),
        format!("Event ID: {}", event.id),
        format!("Player: {player}"),
    ];
    if let Some(hole) = clip.hole {
        lines.push(format!("Hole: {hole}"));
    }
    if let Some(sg_delta) = clip.sg_delta {
        lines.push(format!("Strokes gained on the shot: {sg_delta:+.2}"));
    }
    lines.push("Leaderboard snapshot:".to_string());
    let rows: Vec<String> = board
        .players
        .iter()
        .take(5)
        .map(|row| {
            format!(
                "{}, gross {}, net {}, thru {}",
                row.name, row.gross, row.net, row.thru
            )
        })
        .collect();
    if rows.is_empty() {
        lines.push("No leaderboard context available.".to_string());
    } else {
        lines.extend(rows);
    }
    lines.join("\n")
}

/// Run the full commentary pipeline for one clip.
pub async fn generate_commentary(
    state: &SharedState,
    clip_id: Uuid,
) -> Result<CommentaryResult, ServiceError> {
    let clips = state.clips().await;
    let clip = clips
        .fetch(clip_id)
        .ok_or_else(|| ServiceError::NotFound(format!("clip {clip_id}")))?;
    let event_id = clip.event_id;

    state.commentary.upsert(
        clip_id,
        event_id,
        CommentaryStatus::Queued,
        CommentaryUpdate {
            sg_delta: clip.sg_delta,
            ..CommentaryUpdate::default()
        },
    );

    if state.events.is_safe(event_id) {
        state.commentary.upsert(
            clip_id,
            event_id,
            CommentaryStatus::BlockedSafe,
            CommentaryUpdate::default(),
        );
        telemetry::emit(
            "clip.commentary.blocked_safe",
            json!({ "eventId": event_id, "clipId": clip_id }),
        );
        return Err(ServiceError::SafetyBlocked(
            "commentary is disabled while the event is tournament-safe".into(),
        ));
    }

    state.commentary.upsert(
        clip_id,
        event_id,
        CommentaryStatus::Running,
        CommentaryUpdate::default(),
    );
    telemetry::emit(
        "clip.commentary.running",
        json!({ "eventId": event_id, "clipId": clip_id }),
    );

    match run_generation(state, &clip, event_id).await {
        Ok(result) => {
            state.commentary.upsert(
                clip_id,
                event_id,
                CommentaryStatus::Ready,
                CommentaryUpdate {
                    title: Some(result.title.clone()),
                    summary: Some(result.summary.clone()),
                    tts_url: result.tts_url.clone(),
                    sg_delta: clip.sg_delta,
                },
            );
            telemetry::emit(
                "clip.commentary.done",
                json!({
                    "eventId": event_id,
                    "clipId": clip_id,
                    "hasTts": result.tts_url.is_some(),
                }),
            );
            Ok(result)
        }
        Err(err) => {
            state.commentary.upsert(
                clip_id,
                event_id,
                CommentaryStatus::Failed,
                CommentaryUpdate::default(),
            );
            telemetry::emit(
                "clip.commentary.failed",
                json!({
                    "eventId": event_id,
                    "clipId": clip_id,
                    "error": err.to_string(),
                }),
            );
            Err(err)
        }
    }
}

async fn run_generation(
    state: &SharedState,
    clip: &ClipRecord,
    event_id: Uuid,
) -> Result<CommentaryResult, ServiceError> {
    let event = state
        .events
        .get_event(event_id)
        .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;
    let board = build_board(&event.settings.gross_net, state.events.board_input(event_id)?);
    let player = player_label(state, &clip.player_id, event_id);
    let prompt = build_prompt(clip, &event, &board, &player);

    let llm = state.llm().await;
    let generated = llm.generate(prompt).await?;
    let title = truncate(&generated.title, TITLE_LIMIT);
    let summary = truncate(&generated.summary, SUMMARY_LIMIT);

    let tts_url = synthesize_tts(state)?;

    let clips = state.clips().await;
    clips.update_ai_commentary(clip.id, &title, &summary, tts_url.clone());
    Ok(CommentaryResult {
        clip_id: clip.id,
        title,
        summary,
        tts_url,
    })
}

/// Display name for the prompt; member ids never reach the LLM.
fn player_label(state: &SharedState, player_id: &Uuid, event_id: Uuid) -> String {
    state
        .events
        .member_name(event_id, &player_id.simple().to_string())
        .or_else(|| state.events.member_name(event_id, &player_id.to_string()))
        .unwrap_or_else(|| "Player".into())
}

fn synthesize_tts(state: &SharedState) -> Result<Option<String>, ServiceError> {
    if !state.config.llm.tts_enabled {
        return Ok(None);
    }
    Err(ServiceError::Disabled(format!(
        "TTS provider '{}' not configured",
        state.config.llm.tts_provider
    )))
}

/// Cut at `limit` characters and strip trailing whitespace after the cut.
fn truncate(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .take(limit)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use crate::store::clips::ClipsRepository;
    use crate::store::events::{SettingsPatch, TvFlagsPatch};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        calls: Arc<AtomicUsize>,
        title: String,
        summary: String,
    }

    impl LlmClient for StubLlm {
        fn generate(
            &self,
            _prompt: String,
        ) -> BoxFuture<'static, Result<LlmCommentary, ServiceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let title = self.title.clone();
            let summary = self.summary.clone();
            Box::pin(async move { Ok(LlmCommentary { title, summary }) })
        }
    }

    async fn seeded_clip(state: &crate::state::SharedState) -> (Uuid, Uuid) {
        let event = state.events.create_event("Club Night", None).unwrap();
        let clips = state.clips().await;
        let clip = clips.create_placeholder(event.id, Uuid::new_v4(), Some(9), "fp", None);
        clips.mark_processing(clip, "https://example.com/raw.mp4");
        clips.mark_ready(clip, "https://cdn/clips/master.m3u8", None, None, Some(9_000));
        (event.id, clip)
    }

    #[tokio::test]
    async fn safe_event_blocks_without_calling_the_llm() {
        let state = test_state();
        let (event, clip) = seeded_clip(&state).await;
        state
            .events
            .update_settings(
                event,
                SettingsPatch {
                    gross_net: None,
                    tv_flags: Some(TvFlagsPatch {
                        safe: Some(true),
                        ..TvFlagsPatch::default()
                    }),
                },
            )
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        state
            .install_llm(Arc::new(StubLlm {
                calls: calls.clone(),
                title: "unused".into(),
                summary: "unused".into(),
            }))
            .await;

        let err = generate_commentary(&state, clip).await.unwrap_err();
        assert!(matches!(err, ServiceError::SafetyBlocked(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            state.commentary.get(clip).unwrap().status,
            CommentaryStatus::BlockedSafe
        );
    }

    #[tokio::test]
    async fn generation_persists_truncated_commentary() {
        let state = test_state();
        let (_event, clip) = seeded_clip(&state).await;

        let calls = Arc::new(AtomicUsize::new(0));
        state
            .install_llm(Arc::new(StubLlm {
                calls: calls.clone(),
                title: "T".repeat(80),
                summary: "A towering approach settles close. ".repeat(10),
            }))
            .await;

        let result = generate_commentary(&state, clip).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.title.chars().count(), 60);
        assert!(result.summary.chars().count() <= 200);
        assert!(result.tts_url.is_none());

        let record = state.commentary.get(clip).unwrap();
        assert_eq!(record.status, CommentaryStatus::Ready);
        let stored = state.clips().await.fetch(clip).unwrap();
        assert_eq!(stored.ai_title.as_deref(), Some(result.title.as_str()));
    }

    #[tokio::test]
    async fn llm_failure_marks_the_queue_failed() {
        let state = test_state();
        let (_event, clip) = seeded_clip(&state).await;

        struct FailingLlm;
        impl LlmClient for FailingLlm {
            fn generate(
                &self,
                _prompt: String,
            ) -> BoxFuture<'static, Result<LlmCommentary, ServiceError>> {
                Box::pin(async { Err(ServiceError::Internal("invalid LLM response".into())) })
            }
        }
        state.install_llm(Arc::new(FailingLlm)).await;

        assert!(generate_commentary(&state, clip).await.is_err());
        assert_eq!(
            state.commentary.get(clip).unwrap().status,
            CommentaryStatus::Failed
        );
    }

    #[test]
    fn prompt_carries_event_player_and_board() {
        let state = test_state();
        let event = state.events.create_event("Club Night", None).unwrap();
        let clip = ClipRecord {
            id: Uuid::new_v4(),
            event_id: event.id,
            player_id: Uuid::new_v4(),
            round_id: None,
            hole: Some(9),
            fingerprint: "fp".into(),
            status: crate::store::clips::ClipStatus::Ready,
            src_uri: None,
            hls_url: None,
            mp4_url: None,
            thumb_url: None,
            duration_ms: None,
            error: None,
            visibility: "event".into(),
            reactions: Default::default(),
            sg_delta: Some(0.8),
            ai_title: None,
            ai_summary: None,
            ai_tts_url: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let board = build_board("net", Vec::new());
        let prompt = build_prompt(&clip, &event, &board, "Ada");
        assert!(prompt.contains("Club Night"));
        assert!(prompt.contains("Hole: 9"));
        assert!(prompt.contains("Player: Ada"));
        // The member id stays out of the prompt.
        assert!(!prompt.contains(&clip.player_id.to_string()));
        assert!(prompt.contains("avoid giving advice"));
        assert!(prompt.contains("No leaderboard context available."));
    }

    #[test]
    fn player_label_resolves_the_member_name_or_falls_back() {
        let state = test_state();
        let event = state.events.create_event("Club Night", None).unwrap();
        let player = Uuid::new_v4();
        state
            .events
            .register_member(
                event.id,
                &player.simple().to_string(),
                crate::store::events::MemberRole::Player,
                Some("Ada".into()),
            )
            .unwrap();

        assert_eq!(player_label(&state, &player, event.id), "Ada");
        assert_eq!(player_label(&state, &Uuid::new_v4(), event.id), "Player");
    }
}
