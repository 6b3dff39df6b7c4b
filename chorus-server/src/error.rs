use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chorus_core::ChorusError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] ChorusError),

    #[error("malformed JSON body: {0}")]
    MalformedBody(#[from] JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MalformedBody(rejection) => {
                (StatusCode::BAD_REQUEST, format!("malformed JSON body: {}", rejection.body_text()))
            }
            ApiError::Core(ChorusError::BadRequest(message)) => {
                (StatusCode::BAD_REQUEST, message.clone())
            }
            ApiError::Core(ChorusError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            }
            ApiError::Core(ChorusError::Conflict(message)) => {
                (StatusCode::CONFLICT, message.clone())
            }
            ApiError::Core(error) => {
                tracing::error!("Request failed: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
