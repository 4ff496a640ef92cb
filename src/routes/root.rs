use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, IntoMakeService};
use http::{HeaderValue, Method, StatusCode, Uri};
use log::{error, warn};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::propagate_header::PropagateHeaderLayer;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use crate::config::settings::{Server, SETTINGS};
use crate::error::errors::Error;
use crate::middleware::request_id_mw::{generate_request_id_mw, REQUEST_ID_HEADER};
use crate::pipeline::emotion_pipeline::emotion_pipeline::EmotionPipeline;
use crate::response::common_response::{ApiResponseBuilder, ApiResponseResult, HealthResponse};
use crate::routes::detect::new_detect_route;
use crate::state::emotion_state::EmotionState;

#[derive(Clone)]
pub struct RouterState {
    emotion_pipeline: Arc<EmotionPipeline>,
}

impl RouterState {
    pub fn new(emotion_pipeline: EmotionPipeline) -> Self {
        RouterState {
            emotion_pipeline: Arc::new(emotion_pipeline),
        }
    }
}

pub fn root_routes(router_state: RouterState) -> IntoMakeService<Router> {
    build_router(router_state, &SETTINGS.server).into_make_service()
}

pub fn build_router(router_state: RouterState, server: &Server) -> Router {
    let detect_route = {
        let emotion_state = EmotionState::new(&router_state.emotion_pipeline, server.mask_detection_errors);
        new_detect_route(server.max_request_size())
            .with_state(emotion_state)
    };

    let app_router = Router::new()
        .merge(Router::new().route("/health", get(healthcheck)))
        .merge(detect_route)
        .fallback(fallback)
        .layer(CompressionLayer::new())
        .layer(PropagateHeaderLayer::new(header::HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(cors_layer(&server.cors_origin))
        .layer(middleware::from_fn(generate_request_id_mw));

    let app_router = match server.request_timeout {
        Some(request_timeout) => app_router.layer(TimeoutLayer::new(Duration::from_secs(request_timeout))),
        None => app_router,
    };

    app_router
        .layer(SetSensitiveHeadersLayer::new(std::iter::once(header::AUTHORIZATION)))
        .layer(CatchPanicLayer::custom(handle_panic))
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            warn!("invalid cors origin [{cors_origin}], cross-origin requests are disabled: {e}");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::HeaderName::from_static(REQUEST_ID_HEADER)])
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!("request handler panicked: {detail}");

    Error::Server.into_response()
}

async fn fallback(uri: Uri) -> Error {
    Error::NotFound(uri.to_string())
}

async fn healthcheck() -> ApiResponseResult<HealthResponse> {
    Ok(ApiResponseBuilder::new()
        .status_code(StatusCode::OK)
        .body(HealthResponse {
            status: "OK".to_string(),
        })
        .build())
}
