pub mod drawing;
pub mod error;
pub mod handlers;
pub mod logic;
pub mod presence;
pub mod rooms;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{ping_handler, rooms_handler, stats_handler, ws_handler};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ping", get(ping_handler))
        .route("/api/rooms", get(rooms_handler))
        .route("/api/rooms/:room_id/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
