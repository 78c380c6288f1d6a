use crate::interface_adapters::feed::feed_handler;
use crate::interface_adapters::handlers::{
    active_event, fix, presence, register, remove_all, restore_world, stats, unregister, upgrade,
    user_settings,
};
use crate::interface_adapters::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/generators/register", post(register))
        .route("/generators/unregister", post(unregister))
        .route("/generators/fix", post(fix))
        .route("/generators/upgrade", post(upgrade))
        .route("/owners/remove-all", post(remove_all))
        .route("/presence", post(presence))
        .route("/events/active", post(active_event))
        .route("/worlds/restore", post(restore_world))
        .route("/users/settings", post(user_settings))
        .route("/stats", get(stats))
        .route("/feed", get(feed_handler))
        .with_state(state)
}
