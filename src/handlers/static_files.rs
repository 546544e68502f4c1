use axum::{
    body::Body,
    extract::Request,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::debug;

/// Serve `rest` from a mounted directory.
///
/// `ServeDir` keeps lookups inside its root, so `..` segments cannot escape
/// the mount.
pub async fn serve_static(service: ServeDir, rest: &str, req: Request) -> Response {
    let path_and_query = match req.uri().query() {
        Some(query) => format!("/{}?{}", rest, query),
        None => format!("/{}", rest),
    };
    let uri: Uri = match path_and_query.parse() {
        Ok(uri) => uri,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    debug!("Static request for {}", uri.path());

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    match service.oneshot(Request::from_parts(parts, body)).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    }
}
