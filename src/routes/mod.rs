use axum::Router;

use crate::state::SharedState;

pub mod clips;
pub mod commentary;
pub mod docs;
pub mod events;
pub mod feed;
pub mod health;
pub mod live;
pub mod moderation;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(events::router())
        .merge(clips::router())
        .merge(live::router())
        .merge(moderation::router())
        .merge(commentary::router())
        .merge(feed::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
