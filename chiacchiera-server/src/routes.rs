use axum::{
    routing::{get, post, put},
    Extension, Router,
};
use std::sync::Arc;

use crate::controllers;
use crate::{health_with_pool, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|Extension(state): Extension<Arc<AppState>>| async move {
            health_with_pool(&state.pool).await
        }))
        .route("/api/register", post(controllers::register))
        .route("/api/login", post(controllers::login))
        .route("/api/groups", post(controllers::create_group).get(controllers::list_groups))
        .route("/api/groups/:group_id", get(controllers::get_group))
        .route("/api/groups/:group_id/members", post(controllers::add_member))
        .route(
            "/api/groups/:group_id/messages",
            get(controllers::list_messages).post(controllers::create_message),
        )
        .route(
            "/api/groups/:group_id/messages/:message_id",
            put(controllers::edit_message).delete(controllers::delete_message),
        )
        .route("/api/groups/:group_id/messages/:message_id/read", post(controllers::mark_read))
        .route("/ws", get(controllers::ws_handler))
        .layer(Extension(state))
}
