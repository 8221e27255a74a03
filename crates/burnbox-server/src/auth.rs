use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::{store::model::now, AppState};

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests signed further than this from the local clock are replayed or stale.
pub const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;
const MAX_BODY_BYTES: usize = 64 * 1024;
const SIGNATURE_VERSION: &str = "v0";

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("malformed timestamp")]
    BadTimestamp,
    #[error("timestamp outside the allowed window")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
    #[error("invalid signing key")]
    InvalidKey,
}

/// `v0=` followed by the hex HMAC-SHA256 of `v0:<timestamp>:<body>`.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_VERSION}={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a request's signature headers against `body` at time `now`.
pub fn verify(
    secret: &[u8],
    headers: &HeaderMap,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let (Some(timestamp), Some(signature)) = (
        header(headers, TIMESTAMP_HEADER),
        header(headers, SIGNATURE_HEADER),
    ) else {
        return Err(SignatureError::MissingHeaders);
    };

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    if (now - ts).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Stale);
    }

    let expected = sign(secret, timestamp, body)?;
    if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Axum middleware that rejects requests not signed with the shared signing secret.
///
/// The body is buffered for verification and handed on unchanged.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.signing_secret.as_deref() else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "rejecting unreadable request body");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"status": "Request body too large"})),
            )
                .into_response();
        }
    };

    if let Err(e) = verify(secret.as_bytes(), &parts.headers, &bytes, now()) {
        warn!(reason = %e, path = %parts.uri.path(), "rejecting unsigned request");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"status": "Signature not valid"})),
        )
            .into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
