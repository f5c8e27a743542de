//! Environment-backed runtime configuration.

use std::{env, path::PathBuf};

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Optional process-wide API key; requests must present it in `x-api-key`
    /// when [`AppConfig::require_api_key`] is set.
    pub api_key: Option<String>,
    /// When true, requests without a matching API key are rejected.
    pub require_api_key: bool,
    /// Base URL used when building join and viewer links.
    pub web_base_url: String,
    /// Live streaming and viewer-token settings.
    pub live: LiveConfig,
    /// Media URL rewriting and upload presigning settings.
    pub media: MediaConfig,
    /// Clip reactions and ranking settings.
    pub clips: ClipsConfig,
    /// LLM and TTS provider settings for the commentary pipeline.
    pub llm: LlmConfig,
    /// Directory for the daily moderation audit logs.
    pub moderation_data_dir: PathBuf,
}

/// Live stream supervisor and signed-token settings.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// HMAC key for viewer tokens and invites; unset disables signing.
    pub sign_key: Option<String>,
    /// When set, started streams use `<prefix>/<event>/index.m3u8` without a
    /// real ingest.
    pub mock_prefix: Option<String>,
    /// Ingest URL required for non-mock streams.
    pub ingest_url: Option<String>,
    /// Directory for the `streams.jsonl` transition log; unset disables it.
    pub data_dir: Option<PathBuf>,
}

/// CDN rewrite and upload presign settings.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// CDN base URL media links are rewritten onto.
    pub cdn_base_url: Option<String>,
    /// Origin base URL whose absolute links are eligible for rewriting.
    pub origin_base_url: Option<String>,
    /// Additional hostnames eligible for CDN rewriting.
    pub rewrite_hosts: Vec<String>,
    /// Base URL presigned uploads point at; unset uses a local mock.
    pub uploads_base_url: Option<String>,
}

/// Clip reaction limits and top-shot ranking weights.
#[derive(Debug, Clone)]
pub struct ClipsConfig {
    /// Minimum seconds between reactions from the same member on a clip.
    pub reaction_rate_limit_secs: u64,
    /// Sliding window used for "recent reactions".
    pub recent_window_secs: u64,
    /// Log-total coefficient in the ranking weight.
    pub weight_alpha: f64,
    /// Age-decay coefficient in the ranking weight.
    pub weight_beta: f64,
    /// Visibility assigned to clips that do not request one.
    pub default_visibility: String,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: u64,
}

/// Commentary LLM/TTS provider settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Master switch; the pipeline fails fast when disabled.
    pub enabled: bool,
    /// Provider name; only `openai` is supported.
    pub provider: String,
    /// Chat model identifier.
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Whether to synthesize TTS after a successful generation.
    pub tts_enabled: bool,
    /// TTS provider name, for the not-configured error message.
    pub tts_provider: String,
}

const DEFAULT_WEB_BASE_URL: &str = "https://app.fairway.dev";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50_000_000;

impl AppConfig {
    /// Load configuration from the process environment, applying defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty(env::var("API_KEY").ok()),
            require_api_key: env_flag("REQUIRE_API_KEY"),
            web_base_url: non_empty(env::var("WEB_BASE_URL").ok())
                .unwrap_or_else(|| DEFAULT_WEB_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            live: LiveConfig {
                sign_key: non_empty(env::var("LIVE_VIEWER_SIGN_KEY").ok()),
                mock_prefix: non_empty(env::var("LIVE_STREAM_MOCK_PREFIX").ok()),
                ingest_url: non_empty(env::var("LIVE_STREAM_INGEST_URL").ok()),
                data_dir: non_empty(env::var("LIVE_STREAM_DATA_DIR").ok()).map(PathBuf::from),
            },
            media: MediaConfig {
                cdn_base_url: non_empty(env::var("MEDIA_CDN_BASE_URL").ok()),
                origin_base_url: non_empty(env::var("MEDIA_ORIGIN_BASE_URL").ok()),
                rewrite_hosts: non_empty(env::var("MEDIA_CDN_REWRITE_HOSTS").ok())
                    .map(|raw| {
                        raw.split(',')
                            .map(|host| host.trim().to_string())
                            .filter(|host| !host.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                uploads_base_url: non_empty(env::var("UPLOADS_BASE_URL").ok()),
            },
            clips: ClipsConfig {
                reaction_rate_limit_secs: env_u64("CLIPS_REACTION_RATE_LIMIT_SECONDS", 10),
                recent_window_secs: env_u64("CLIPS_REACTION_RECENT_WINDOW", 60),
                weight_alpha: env_f64("CLIPS_WEIGHT_ALPHA", 1.5),
                weight_beta: env_f64("CLIPS_WEIGHT_BETA", 0.5),
                default_visibility: non_empty(env::var("CLIPS_VISIBILITY_DEFAULT").ok())
                    .unwrap_or_else(|| "event".into()),
                max_upload_bytes: env_u64("CLIPS_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            },
            llm: LlmConfig {
                enabled: env_flag("LLM_ENABLED"),
                provider: non_empty(env::var("LLM_PROVIDER").ok())
                    .unwrap_or_else(|| "openai".into())
                    .to_lowercase(),
                model: non_empty(env::var("LLM_MODEL").ok())
                    .unwrap_or_else(|| "gpt-4o-mini".into()),
                api_key: non_empty(env::var("OPENAI_API_KEY").ok()),
                tts_enabled: env_flag("TTS_ENABLED"),
                tts_provider: non_empty(env::var("TTS_PROVIDER").ok())
                    .unwrap_or_else(|| "openai".into())
                    .to_lowercase(),
            },
            moderation_data_dir: non_empty(env::var("MODERATION_DATA_DIR").ok())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/moderation")),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            require_api_key: false,
            web_base_url: DEFAULT_WEB_BASE_URL.into(),
            live: LiveConfig {
                sign_key: None,
                mock_prefix: None,
                ingest_url: None,
                data_dir: None,
            },
            media: MediaConfig {
                cdn_base_url: None,
                origin_base_url: None,
                rewrite_hosts: Vec::new(),
                uploads_base_url: None,
            },
            clips: ClipsConfig {
                reaction_rate_limit_secs: 10,
                recent_window_secs: 60,
                weight_alpha: 1.5,
                weight_beta: 0.5,
                default_visibility: "event".into(),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            llm: LlmConfig {
                enabled: false,
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
                api_key: None,
                tts_enabled: false,
                tts_provider: "openai".into(),
            },
            moderation_data_dir: PathBuf::from("data/moderation"),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
