use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::ApiError;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Interaction payloads are small; anything larger is not from the platform.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("public key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("public key must be 32 bytes, got {0}")]
    Length(usize),

    #[error("public key is not a valid ed25519 point: {0}")]
    Point(#[from] ed25519_dalek::SignatureError),
}

/// Checks the application's Ed25519 signature over `timestamp || body`.
#[derive(Debug, Clone)]
pub struct SignatureVerifier(VerifyingKey);

impl SignatureVerifier {
    pub fn from_hex(public_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(public_key.trim())?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self(VerifyingKey::from_bytes(&bytes)?))
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature_hex: &str) -> bool {
        let Ok(raw) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&raw) else {
            return false;
        };

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.0.verify(&message, &signature).is_ok()
    }
}

/// Middleware that rejects interactions whose signature headers do not
/// verify against the body. The buffered body is handed on unchanged.
pub async fn verify_signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return ApiError::BadRequest("unreadable request body".into()).into_response(),
    };

    let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
    let verified = match (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER)) {
        (Some(signature), Some(timestamp)) => state.verifier.verify(timestamp, &bytes, signature),
        _ => false,
    };

    if !verified {
        tracing::debug!("rejected interaction with bad signature");
        return ApiError::Unauthorized.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
