//! Administrative HTTP side channel: room listing, member counts, and clears.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::state::GatewayState;

#[derive(Debug, Serialize)]
pub struct RoomUsers {
    pub room_id: String,
    pub user_count: usize,
}

/// Routes for the `/api` side channel.
pub fn routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/", get(api_root))
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/{room_id}/users", get(room_users))
        .route("/api/rooms/{room_id}/clear", post(clear_room))
}

async fn api_root() -> Json<Value> {
    Json(json!({ "message": "Whiteboard API is running" }))
}

async fn list_rooms(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({ "rooms": state.rooms.rooms().await }))
}

async fn room_users(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> Json<RoomUsers> {
    let user_count = state.rooms.member_count(&room_id).await;
    Json(RoomUsers { room_id, user_count })
}

async fn clear_room(
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> Json<Value> {
    state.clear_room(&room_id).await;
    info!(room_id = %room_id, "Room cleared via admin API");
    Json(json!({ "message": format!("Room {room_id} cleared successfully") }))
}
