use crate::convert::ConvertError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConvertError::InvalidRequest => StatusCode::BAD_REQUEST,
            ConvertError::TargetResolution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ConvertError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ConvertError>;
