use axum::{
    extract::{Extension, Path, Query, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chiacchiera_core::{
    models::Message, AddMemberRequest, CreateGroupRequest, CreateMessageRequest, EditMessageRequest,
    GroupResponse, ListGroupsResponse, ListMessagesResponse, LoginRequest, LoginResponse,
    RegisterRequest, RegisterResponse,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::{self, CurrentUser};
use crate::error::Result;
use crate::gateway;
use crate::groups::ensure_member;
use crate::AppState;

/// Handler per POST /api/register
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let (user, token) =
        auth::register_user(&state.pool, &req.username, &req.password, req.avatar_url.as_deref()).await?;
    tracing::info!(user = %user.user_id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user, token })))
}

/// Handler per POST /api/login
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = auth::login_user(&state.pool, &req.username, &req.password).await?;
    Ok(Json(LoginResponse { token, user }))
}

/// Handler per POST /api/groups
pub async fn create_group(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    let members = req.members.unwrap_or_default();
    let group = state.groups.create_group(&user.user_id, &req.name, &members).await?;
    Ok((StatusCode::CREATED, Json(GroupResponse { group })))
}

/// Handler per GET /api/groups
pub async fn list_groups(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ListGroupsResponse>> {
    let groups = state.groups.groups_of(&user.user_id).await?;
    Ok(Json(ListGroupsResponse { groups }))
}

/// Handler per GET /api/groups/:group_id
pub async fn get_group(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<String>,
) -> Result<Json<GroupResponse>> {
    let group = ensure_member(state.groups.as_ref(), &group_id, &user.user_id).await?;
    Ok(Json(GroupResponse { group }))
}

/// Handler per POST /api/groups/:group_id/members
pub async fn add_member(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<GroupResponse>> {
    let group = state.groups.add_member(&group_id, &user.user_id, &req.user_id).await?;
    Ok(Json(GroupResponse { group }))
}

/// Handler per GET /api/groups/:group_id/messages?page=&limit=
// query string come mappa: valori non validi ricadono sui default invece di dare 400
pub async fn list_messages(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListMessagesResponse>> {
    let page = params.get("page").map(String::as_str);
    let limit = params.get("limit").map(String::as_str);
    let resp = state.messages.list(&user, &group_id, page, limit).await?;
    Ok(Json(resp))
}

/// Handler per POST /api/groups/:group_id/messages
pub async fn create_message(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<String>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    let message = state.messages.send(&user, &group_id, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Handler per PUT /api/groups/:group_id/messages/:message_id
pub async fn edit_message(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((group_id, message_id)): Path<(String, String)>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>> {
    let message = state.messages.edit(&user, &group_id, &message_id, &req.content).await?;
    Ok(Json(message))
}

/// Handler per DELETE /api/groups/:group_id/messages/:message_id (soft delete)
pub async fn delete_message(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((group_id, message_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.messages.delete(&user, &group_id, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler per POST /api/groups/:group_id/messages/:message_id/read
pub async fn mark_read(
    Extension(state): Extension<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((group_id, message_id)): Path<(String, String)>,
) -> Result<Json<Message>> {
    let message = state.messages.mark_read(&user, &group_id, &message_id).await?;
    Ok(Json(message))
}

/// Handler per /ws
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| gateway::serve_socket(socket, state, token))
}
