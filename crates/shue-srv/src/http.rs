//! Thin HTTP transport over the CA core.
//!
//! Handlers extract a query parameter, call into the core, and return its
//! output verbatim; the only logic here is mapping the error taxonomy to
//! HTTP status codes.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, warn};

use shue_ca::{CaError, CertificateAuthority};

/// Shared state for the handlers.
pub struct AppState {
    pub ca: CertificateAuthority,
    /// Directory `/cert` serves stored PEM files from.
    pub cert_dir: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/request", get(request_challenge))
        .route("/challenge", get(published_challenge))
        .route("/validate", get(validate))
        .route("/cert", get(stored_cert))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DomainParams {
    #[serde(default)]
    domain: String,
}

#[derive(Debug, Deserialize)]
struct CertParams {
    #[serde(default)]
    name: String,
}

/// `GET /request?domain=`: create a challenge and return its token.
async fn request_challenge(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainParams>,
) -> Response {
    match state.ca.request_challenge(&params.domain) {
        Ok(token) => (StatusCode::OK, token).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /challenge?domain=`: return the TXT value currently live in DNS.
async fn published_challenge(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainParams>,
) -> Response {
    match state.ca.published_challenge(&params.domain).await {
        Ok(value) => (StatusCode::OK, value).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /validate?domain=`: validate the outstanding challenge and return
/// `<certificate PEM>;<private key PEM>`.
async fn validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainParams>,
) -> Response {
    match state.ca.issue(&params.domain).await {
        Ok((cert, key)) => (StatusCode::OK, format!("{cert};{key}")).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /cert?name=`: serve a stored PEM file by bare name.
async fn stored_cert(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CertParams>,
) -> Response {
    if !is_bare_name(&params.name) {
        return (StatusCode::UNPROCESSABLE_ENTITY, String::from("invalid name")).into_response();
    }

    let path = state.cert_dir.join(format!("{}.pem", params.name));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            debug!(path = %path.display(), bytes = content.len(), "served stored cert");
            (StatusCode::OK, content).into_response()
        }
        Err(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response(),
    }
}

/// A file name with no path structure.
fn is_bare_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

fn error_response(err: &CaError) -> Response {
    let status = match err {
        CaError::InvalidDomain => StatusCode::BAD_REQUEST,
        CaError::ChallengeVerification(_) | CaError::ChallengeMismatch => {
            StatusCode::UNAUTHORIZED
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(%err, "request failed");
    }
    (status, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_filter() {
        assert!(is_bare_name("server"));
        assert!(is_bare_name("client-1"));
        assert!(!is_bare_name(""));
        assert!(!is_bare_name("../ca-key"));
        assert!(!is_bare_name("sub/dir"));
        assert!(!is_bare_name("win\\dir"));
    }
}
