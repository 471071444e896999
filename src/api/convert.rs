use std::sync::Arc;

use crate::api::{AppState, error::ApiResult};
use crate::convert::{ConversionRequest, ConversionResult, ConvertError};
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tracing::debug;

/// `POST /convert`
///
/// Bodies that are not JSON, or whose fields have the wrong shape, get the
/// same 400 as a missing field.
pub async fn convert_currencies(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> ApiResult<Json<ConversionResult>> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(error = %rejection, "Rejected conversion request body");
        ConvertError::InvalidRequest
    })?;
    let result = state.converter.convert(&request).await?;
    Ok(Json(result))
}
