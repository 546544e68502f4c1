use utoipa::OpenApi;
use crate::models::*;

/// Path the poll endpoint is documented under before the prefix is applied
const SESSION_DOC_PATH: &str = "/log/{doc_id}";

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Storage backend is usable", body = HealthResponse),
        (status = 503, description = "Storage backend is unavailable", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Live sessions, connections and resource usage
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics snapshot", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Polling exchange for one document.
///
/// The body is a `type`-tagged message: `append {ops}` or
/// `getSince {version, limit?, durationMs?}`. A GET with WebSocket upgrade
/// headers on the same path opens a streaming connection instead
/// (subprotocols `dotlz`, `dotl`).
#[utoipa::path(
    post,
    path = "/log/{doc_id}",
    params(
        ("doc_id" = String, Path, description = "Document identifier, used verbatim")
    ),
    request_body(content = String, content_type = "application/json", description = "append or getSince message"),
    responses(
        (status = 200, description = "Exchange completed", body = PollResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 415, description = "Unsupported content type", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = PollResponse),
        (status = 503, description = "Session could not be created", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn session_poll_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        session_poll_doc,
    ),
    components(
        schemas(HealthResponse, DiagnosticsResponse, ErrorResponse, PollResponse, Operation)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;

/// The OpenAPI document with the poll endpoint under `session_prefix`
pub fn api_doc(session_prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if let Some(item) = doc.paths.paths.remove(SESSION_DOC_PATH) {
        doc.paths.paths.insert(format!("{}{{doc_id}}", session_prefix), item);
    }
    doc
}
