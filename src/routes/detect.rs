use axum::extract::DefaultBodyLimit;
use axum::Router;
use axum::routing::post;
use crate::handler::emotion_handler::detect_emotions;
use crate::state::emotion_state::EmotionState;

/// `POST /detect`. The multipart reader stops at `max_request_size`; the
/// handler answers that like any other oversized upload.
pub fn new_detect_route(max_request_size: usize) -> Router<EmotionState> {

    let router = Router::new()
        .route("/detect", post(detect_emotions))
        .layer(DefaultBodyLimit::max(max_request_size));
    router
}
