use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Fairway Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::events::create_event,
        crate::routes::events::join_event,
        crate::routes::events::register_players,
        crate::routes::events::list_players,
        crate::routes::events::submit_score,
        crate::routes::events::get_board,
        crate::routes::events::update_settings,
        crate::routes::events::set_status,
        crate::routes::events::regenerate_code,
        crate::routes::events::host_state,
        crate::routes::clips::presign,
        crate::routes::clips::complete,
        crate::routes::clips::react,
        crate::routes::clips::list_clips,
        crate::routes::clips::get_clip,
        crate::routes::live::start_live,
        crate::routes::live::stop_live,
        crate::routes::live::live_status,
        crate::routes::live::mint_token,
        crate::routes::live::viewer_link,
        crate::routes::live::exchange_invite,
        crate::routes::moderation::report_clip,
        crate::routes::moderation::moderation_queue,
        crate::routes::moderation::apply_action,
        crate::routes::moderation::clips_feed,
        crate::routes::commentary::generate,
        crate::routes::commentary::list_for_event,
        crate::routes::commentary::get_entry,
        crate::routes::commentary::play_tts,
        crate::routes::feed::home,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::events::CreateEventRequest,
            crate::dto::events::CreateEventResponse,
            crate::dto::events::JoinRequest,
            crate::dto::events::JoinResponse,
            crate::dto::events::PlayerEntry,
            crate::dto::events::RegisterPlayersRequest,
            crate::dto::events::RegisterPlayersResponse,
            crate::dto::events::PlayersResponse,
            crate::dto::events::ScoreRequest,
            crate::dto::events::ScoreResponse,
            crate::dto::events::BoardRowDto,
            crate::dto::events::BoardResponse,
            crate::dto::events::TvFlagsRequest,
            crate::dto::events::SettingsRequest,
            crate::dto::events::TvFlagsDto,
            crate::dto::events::SettingsResponse,
            crate::dto::events::StatusRequest,
            crate::dto::events::StatusResponse,
            crate::dto::events::CodeRegenerateResponse,
            crate::dto::events::HostStateResponse,
            crate::dto::clips::PresignRequest,
            crate::dto::clips::PresignResponse,
            crate::dto::clips::CompleteRequest,
            crate::dto::clips::CompleteResponse,
            crate::dto::clips::ReactRequest,
            crate::dto::clips::ReactResponse,
            crate::dto::clips::ReactionsDto,
            crate::dto::clips::ClipPublic,
            crate::dto::clips::ClipListResponse,
            crate::dto::live::StartLiveRequest,
            crate::dto::live::StartLiveResponse,
            crate::dto::live::StopLiveResponse,
            crate::dto::live::LiveStatusResponse,
            crate::dto::live::MintTokenRequest,
            crate::dto::live::MintTokenResponse,
            crate::dto::live::ViewerLinkResponse,
            crate::dto::live::ExchangeInviteRequest,
            crate::dto::live::ExchangeInviteResponse,
            crate::dto::moderation::ReportRequest,
            crate::dto::moderation::ReportResponse,
            crate::dto::moderation::ActionRequest,
            crate::dto::moderation::ModerationStateDto,
            crate::dto::moderation::QueueResponse,
            crate::dto::moderation::ModeratedClipDto,
            crate::dto::moderation::ClipsFeedResponse,
            crate::dto::commentary::CommentaryDto,
            crate::dto::commentary::CommentaryListResponse,
            crate::dto::commentary::GenerateCommentaryResponse,
            crate::dto::commentary::PlayTtsResponse,
            crate::dto::feed::LiveEntryDto,
            crate::dto::feed::HomeResponse,
        )
    ),
    tags(
        (name = "events", description = "Events, membership, scoring and the leaderboard"),
        (name = "clips", description = "Clip upload, transcoding and reactions"),
        (name = "live", description = "Live streams and viewer access"),
        (name = "moderation", description = "Reports, the admin queue and actions"),
        (name = "commentary", description = "AI commentary queue"),
        (name = "feed", description = "Cross-event home feed"),
    )
)]
pub struct ApiDoc;
