use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use bytes::{BufMut, BytesMut};
use log::error;
use crate::error::errors::Error;

pub type ApiResponseResult<T> = Result<ApiResponse<T>, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub status_code: StatusCode,
}

pub struct ApiResponseBuilder<T: Serialize> {
    pub data: Option<T>,
    pub status_code: StatusCode,
}

impl<T> Default for ApiResponseBuilder<T>
    where
        T: Serialize,
{
    fn default() -> Self {
        Self {
            data: None,
            status_code: StatusCode::OK,
        }
    }
}

impl<T> ApiResponseBuilder<T>
    where
        T: Serialize,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: T) -> Self {
        self.data = Some(body);
        self
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn build(self) -> ApiResponse<T> {
        ApiResponse {
            data: self.data,
            status_code: self.status_code,
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
    where
        T: Serialize,
{
    fn into_response(self) -> Response {

        let data = match self.data {
            Some(data) => {data},
            None => return (self.status_code).into_response(),
        };

        let mut bytes = BytesMut::new().writer();
        if let Err(err) = serde_json::to_writer(&mut bytes, &data) {
            error!("Error serializing response body as JSON: {:?}", err);
            return Error::Server.into_response();
        }

        let bytes = bytes.into_inner().freeze();
        let headers = [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()),
        )];

        (self.status_code, headers, bytes).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_serializes_body() {
        let response = ApiResponseBuilder::new()
            .status_code(StatusCode::OK)
            .body(HealthResponse { status: "OK".to_string() })
            .build()
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"OK"}"#);
    }

    #[tokio::test]
    async fn test_builder_without_body() {
        let response = ApiResponseBuilder::<HealthResponse>::new()
            .status_code(StatusCode::NO_CONTENT)
            .build()
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
