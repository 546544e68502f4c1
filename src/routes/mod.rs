pub mod api;
pub mod mounts;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    response::Response,
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::api_doc;
use crate::handlers::{landing_page, serve_static, session_endpoint};
use crate::AppState;
pub use api::create_api_routes;
pub use mounts::{MountTable, Route};

/// Assemble the full application router.
///
/// Operational routes are matched first; every other request goes through
/// the mount table.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = state.origin_policy.cors_layer();
    let openapi = api_doc(state.mounts.session_prefix());
    Router::new()
        .nest("/api", create_api_routes())
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", openapi))
        .fallback(dispatch)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    match state.mounts.resolve(&path) {
        Route::Static { index, rest } => match state.mounts.static_service(index) {
            Some(service) => serve_static(service, rest, req).await,
            None => landing_page(&state),
        },
        Route::Session { doc_id } => session_endpoint(state.clone(), doc_id.to_string(), req).await,
        Route::Landing => landing_page(&state),
    }
}
