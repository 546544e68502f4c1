use axum::{
    http::header,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// Serve the landing document for every path no mount claims
pub fn landing_page(state: &AppState) -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        state.landing.clone(),
    )
        .into_response()
}
