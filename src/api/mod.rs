pub mod convert;
pub mod error;

use crate::convert::ConversionService;
use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub struct AppState {
    pub converter: ConversionService,
}

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/convert", post(convert::convert_currencies))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
