use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use vouch_gateway::connection;

use crate::state::AppState;
use crate::uploads::MULTIPART_OVERHEAD;
use crate::{auth, challenges, messages, notifications, uploads};

/// The whole HTTP surface: JSON API, uploads, static files and the socket.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;
    let upload_dir = state.upload_dir.clone();

    let api = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/users", get(auth::list_users))
        .route("/api/users/username", get(auth::get_username))
        .route(
            "/api/challenges",
            get(challenges::list_challenges).post(challenges::create_challenge),
        )
        .route("/api/challenges/{id}", delete(challenges::delete))
        .route("/api/challenges/{id}/status", put(challenges::update_status))
        .route("/api/challenges/{id}/coach", put(challenges::reassign_coach))
        .route("/api/challenges/{id}/archive", put(challenges::archive))
        .route(
            "/api/challenges/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/api/challenges/{id}/messages/read", put(messages::mark_read))
        .route("/api/messages/{id}/validate", put(messages::validate_message))
        .route("/api/messages/{id}/set-proof", put(messages::set_proof))
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/{id}/read", put(notifications::mark_read))
        .route(
            "/api/upload",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(health))
        .route("/socket", get(socket_upgrade));

    api.nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn socket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rooms = state.service.rooms().clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, rooms))
}
