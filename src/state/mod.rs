//! Central application state.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::jobs::JobBuffer;
use crate::limits::SlidingWindowLimiter;
use crate::media::MediaUrls;
use crate::services::commentary_service::{LlmClient, OpenAiClient};
use crate::services::feed_service::FeedCache;
use crate::store::clips::{ClipsRepository, InMemoryClipsRepository};
use crate::store::commentary::CommentaryQueue;
use crate::store::events::EventsStore;
use crate::store::live::LiveSupervisor;
use crate::store::moderation::ModerationStore;
use crate::tokens::TokenService;

/// Shared handle to [`AppState`].
pub type SharedState = Arc<AppState>;

const REPORT_LIMIT: usize = 5;
const REPORT_WINDOW_S: i64 = 60;
const EXCHANGE_LIMIT: usize = 10;
const EXCHANGE_WINDOW_S: i64 = 60;

/// A recorded score response, replayed for `X-Client-Req-Id` retries.
#[derive(Debug, Clone)]
pub struct ScoreReplay {
    /// HTTP status of the recorded response.
    pub status: u16,
    /// Body of the recorded response.
    pub body: Value,
}

/// Central application state holding every store and service handle.
pub struct AppState {
    /// Runtime configuration.
    pub config: AppConfig,
    /// Events, members, scorecards and scores.
    pub events: EventsStore,
    /// Moderation state and audit log.
    pub moderation: ModerationStore,
    /// Live stream supervisor.
    pub live: LiveSupervisor,
    /// Commentary queue.
    pub commentary: CommentaryQueue,
    /// Pending transcode jobs.
    pub jobs: JobBuffer,
    /// Viewer token and invite signing.
    pub tokens: TokenService,
    /// CDN URL rewriting.
    pub media: MediaUrls,
    /// Cached home feed.
    pub feed: FeedCache,
    /// Per-IP report rate limiter.
    pub report_limiter: SlidingWindowLimiter,
    /// Per (event, IP) invite-exchange rate limiter.
    pub exchange_limiter: SlidingWindowLimiter,
    /// Recorded score responses keyed by (event, request id).
    pub score_replays: DashMap<(Uuid, String), ScoreReplay>,
    clips: RwLock<Arc<dyn ClipsRepository>>,
    llm: RwLock<Arc<dyn LlmClient>>,
}

impl AppState {
    /// Build the state from configuration, wrapped in an [`Arc`] so it can
    /// be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        let clips: Arc<dyn ClipsRepository> =
            Arc::new(InMemoryClipsRepository::new(config.clips.clone()));
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(config.llm.clone()));
        Arc::new(Self {
            events: EventsStore::new(),
            moderation: ModerationStore::new(Some(config.moderation_data_dir.clone())),
            live: LiveSupervisor::new(&config.live),
            commentary: CommentaryQueue::new(),
            jobs: JobBuffer::default(),
            tokens: TokenService::new(config.live.sign_key.clone()),
            media: MediaUrls::new(&config.media),
            feed: FeedCache::new(),
            report_limiter: SlidingWindowLimiter::new(REPORT_LIMIT, REPORT_WINDOW_S),
            exchange_limiter: SlidingWindowLimiter::new(EXCHANGE_LIMIT, EXCHANGE_WINDOW_S),
            score_replays: DashMap::new(),
            clips: RwLock::new(clips),
            llm: RwLock::new(llm),
            config,
        })
    }

    /// Handle to the clips repository.
    pub async fn clips(&self) -> Arc<dyn ClipsRepository> {
        self.clips.read().await.clone()
    }

    /// Swap in a different clips repository implementation.
    pub async fn install_clips(&self, clips: Arc<dyn ClipsRepository>) {
        *self.clips.write().await = clips;
    }

    /// Handle to the LLM client.
    pub async fn llm(&self) -> Arc<dyn LlmClient> {
        self.llm.read().await.clone()
    }

    /// Swap in a different LLM client (used to stub generation in tests).
    pub async fn install_llm(&self, llm: Arc<dyn LlmClient>) {
        *self.llm.write().await = llm;
    }
}
