//! Optional `axum` adapter (component I), grounded on the source project's
//! `handlers::oauth::token_handler` (`State` extraction, `Result<Json<_>,
//! OAuthError>` return shape). Unlike the source handler this one takes the
//! request apart manually rather than through `axum::Form`, since the core
//! driver needs the raw Content-Type header (to enforce the exact media-type
//! precondition of `SPEC_FULL.md` §4.E) and the raw `Authorization` header
//! (for HTTP Basic client authentication) rather than a pre-parsed struct.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use crate::endpoint::{handle_token_request, EndpointOptions, TokenOutcome, TokenRequest};

/// Mounts `POST /oauth/token` against a shared [`EndpointOptions`].
pub fn token_router(options: Arc<EndpointOptions>) -> Router {
    Router::new().route("/oauth/token", post(token_handler)).with_state(options)
}

async fn token_handler(
    State(options): State<Arc<EndpointOptions>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
        authorization_header: headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    match handle_token_request(&request, &options).await {
        TokenOutcome::Response(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
            let mut builder = axum::http::Response::builder().status(status);
            for (name, value) in &response.headers {
                builder = builder.header(*name, *value);
            }
            builder
                .body(axum::body::Body::from(
                    serde_json::to_vec(&response.body).unwrap_or_default(),
                ))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        // The source project has no equivalent: `Provider::token_endpoint`
        // taking over the response entirely is a capability this crate adds
        // for hosts doing their own redirect/consent-screen handling.
        TokenOutcome::Handled => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Convenience wrapper mirroring the source handler's `Json<T>` success
/// shape, for hosts that only ever expect a JSON body back (no `Handled`
/// escape hatch).
pub async fn token_json_handler(
    State(options): State<Arc<EndpointOptions>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Map<String, serde_json::Value>>, StatusCode> {
    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
        authorization_header: headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    match handle_token_request(&request, &options).await {
        TokenOutcome::Response(response) if response.status == 200 => Ok(Json(response.body)),
        TokenOutcome::Response(_) => Err(StatusCode::BAD_REQUEST),
        TokenOutcome::Handled => Err(StatusCode::NO_CONTENT),
    }
}
