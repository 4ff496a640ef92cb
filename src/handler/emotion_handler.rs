use axum::debug_handler;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use bytes::Bytes;
use ecs_logger::extra_fields;
use http::{HeaderMap, StatusCode};
use log::{error, info, warn};
use crate::error::errors::Error;
use crate::logger::logger::LoggerExtraFields;
use crate::models::emotion_model::{EmotionDetectionInput, EmotionDetectionResultOutput, MAX_UPLOAD_SIZE};
use crate::response::common_response::{ApiResponseBuilder, ApiResponseResult};
use crate::state::emotion_state::EmotionState;

const FILE_FIELD: &str = "file";

#[debug_handler(state = EmotionState)]
pub async fn detect_emotions(
    headers: HeaderMap,
    State(state): State<EmotionState>,
    payload: Result<Multipart, MultipartRejection>,
) -> ApiResponseResult<EmotionDetectionResultOutput> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if let Err(e) = extra_fields::set_extra_fields(LoggerExtraFields { request_id }) {
        warn!("failed to attach request id to logs: {e}");
    }
    info!("received emotion detection request");

    let result = detect(&state, payload).await;
    match &result {
        Ok(response) => info!(
            "completed emotion detection with {} faces",
            response.data.as_ref().map_or(0, |data| data.results.len())
        ),
        Err(Error::Server) => error!("emotion detection request failed"),
        Err(e) => info!("rejected emotion detection request: {e}"),
    }

    extra_fields::clear_extra_fields();
    result
}

async fn detect(
    state: &EmotionState,
    payload: Result<Multipart, MultipartRejection>,
) -> ApiResponseResult<EmotionDetectionResultOutput> {
    let im_bytes = read_image_field(payload).await?;

    let result = state
        .emotion_service
        .detect_emotions(EmotionDetectionInput { im_bytes })
        .await?;

    Ok(ApiResponseBuilder::new()
        .status_code(StatusCode::OK)
        .body(result)
        .build())
}

/// Pulls the `file` part out of the form and validates its type and size
/// before anything is decoded.
async fn read_image_field(payload: Result<Multipart, MultipartRejection>) -> Result<Bytes, Error> {
    let mut payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            info!("request is not a multipart form: {e}");
            return Err(Error::MissingFile)
        }
    };

    loop {
        let field = match payload.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(Error::MissingFile),
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(Error::FileTooLarge),
            Err(e) => {
                info!("failed to parse multipart form: {e}");
                return Err(Error::MissingFile)
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .is_some_and(|content_type| content_type.starts_with("image/"));
        if !is_image {
            return Err(Error::InvalidFileType)
        }

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(Error::FileTooLarge),
            Err(e) => {
                info!("failed to read uploaded file: {e}");
                return Err(Error::InvalidImage)
            }
        };

        if data.len() > MAX_UPLOAD_SIZE {
            return Err(Error::FileTooLarge)
        }
        return Ok(data)
    }
}

