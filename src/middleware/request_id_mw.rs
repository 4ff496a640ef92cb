use axum::extract::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use http::header::{HeaderName, HeaderValue};
use log::error;
use uuid::Uuid;
use crate::error::errors::Error;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps every request with a fresh v4 uuid under `x-request-id`. The header
/// is copied onto the response by `PropagateHeaderLayer`.
pub async fn generate_request_id_mw(mut req: Request, next: Next) -> Result<impl IntoResponse, Error> {
    let request_id = Uuid::new_v4().to_string();

    let value = match HeaderValue::from_str(&request_id) {
        Ok(value) => value,
        Err(e) => {
            error!("failed to build request id header: {e}");
            return Err(Error::Server)
        }
    };
    req.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::routing::get;
    use axum::{middleware, Router};
    use http::{HeaderMap, StatusCode};
    use tower::ServiceExt;
    use super::*;

    #[tokio::test]
    async fn test_request_id_is_inserted() {
        let app = Router::new()
            .route("/", get(|headers: HeaderMap| async move {
                headers.get(REQUEST_ID_HEADER).map(|v| v.to_str().unwrap_or_default().to_string()).unwrap_or_default()
            }))
            .layer(middleware::from_fn(generate_request_id_mw));

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let request_id = std::str::from_utf8(&body).unwrap();
        assert!(Uuid::parse_str(request_id).is_ok());
    }
}
