pub mod bookings;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::realtime::ws;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(bookings::routes())
        .route("/ws", get(ws::ws_handler))
}
