//! Route handler: the `/send` relay pipeline.
//!
//! Every request walks the same line: method gate, token gate, body decode,
//! payload validation, transport check, delivery. Each stage has exactly one
//! failure exit and every failure is terminal for the request.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info};

use crate::email::{dispatch, RelayState};

/// Recipient shape check. Deliberately lenient (it admits some invalid
/// addresses and rejects quoted locals); callers rely on its permissiveness,
/// so anything stricter belongs in the mailbox parser at send time.
static RECIPIENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("recipient pattern"));

/// JSON payload for `/send`.
#[derive(Debug, Clone, Deserialize)]
pub struct MailRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    /// HTML body unless the caller explicitly opts out.
    #[serde(rename = "isHtml", default = "default_true", deserialize_with = "bool_or_true")]
    pub is_html: bool,
}

fn default_true() -> bool {
    true
}

/// `null` counts as absent, so it keeps the HTML default.
fn bool_or_true<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(true))
}

impl MailRequest {
    /// Trim caller input once, before any validation looks at it.
    fn normalized(mut self) -> Self {
        self.to = self.to.trim().to_string();
        self.subject = self.subject.trim().to_string();
        self.content = self.content.trim().to_string();
        self
    }
}

/// JSON body of every response the relay produces.
#[derive(Debug, Serialize)]
pub struct MailResponse {
    pub ok: bool,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<AuthDebug>,
}

/// Length metadata attached to a token mismatch. Lengths only, never values.
#[derive(Debug, Serialize)]
pub struct AuthDebug {
    pub expected_len: usize,
    pub received_len: usize,
}

impl MailResponse {
    fn sent(message_id: String) -> Self {
        Self { ok: true, message_id: Some(message_id), error: None, debug: None }
    }

    fn failure(error: &str) -> Self {
        Self { ok: false, message_id: None, error: Some(error.to_string()), debug: None }
    }
}

fn fail(status: StatusCode, error: &str) -> (StatusCode, Json<MailResponse>) {
    (status, Json(MailResponse::failure(error)))
}

/// Full-string equality in constant time; never a prefix or partial match.
fn token_matches(expected: &str, received: &str) -> bool {
    let (a, b) = (expected.as_bytes(), received.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// POST `/send`
///
/// All methods land here so the method gate can answer with the JSON 405
/// body instead of the router's bare default.
pub async fn relay_mail(
    State(state): State<Arc<RelayState>>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<MailResponse>) {
    // 1) Method gate
    if method != Method::POST {
        return fail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    // 2) Token gate. Header lookup is case-insensitive, both sides trimmed.
    let expected = state.service_token.as_str();
    let received = headers
        .get("x-service-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim();
    debug!(
        expected_set = !expected.is_empty(),
        expected_len = expected.len(),
        received_set = !received.is_empty(),
        received_len = received.len(),
        "token check"
    );
    if expected.is_empty() {
        // Deployment misconfiguration, not a caller error.
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "MAIL_SERVICE_TOKEN missing");
    }
    if received.is_empty() {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if !token_matches(expected, received) {
        let mut resp = MailResponse::failure("Unauthorized");
        resp.debug = Some(AuthDebug {
            expected_len: expected.len(),
            received_len: received.len(),
        });
        return (StatusCode::UNAUTHORIZED, Json(resp));
    }

    // 3) Body decode. An absent body reads as the empty object.
    let raw = if body.trim().is_empty() { "{}" } else { body.as_str() };
    let payload: MailRequest = match serde_json::from_str(raw) {
        Ok(p) => p,
        Err(e) => {
            debug!("payload decode failed: {e}");
            return fail(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };
    let payload = payload.normalized();

    // 4) Payload validation, recipient shape first.
    if !RECIPIENT_PATTERN.is_match(&payload.to) {
        return fail(StatusCode::BAD_REQUEST, "Invalid recipient email");
    }
    if payload.subject.is_empty() || payload.content.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Missing subject or content");
    }

    // 5) Transport check. The sender address is required by every transport,
    //    including file mode.
    let Some(mailer) = &state.mailer else {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "SMTP config missing");
    };
    if state.from.is_empty() {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "SMTP config missing");
    }

    // 6) Delivery, exactly once. Provider detail stays in the server log.
    match dispatch(mailer, &state.from, &payload).await {
        Ok(message_id) => {
            info!(to = %payload.to, %message_id, "mail relayed");
            (StatusCode::OK, Json(MailResponse::sent(message_id)))
        }
        Err(e) => {
            error!("delivery failed: {e}");
            fail(StatusCode::BAD_GATEWAY, "SMTP failed")
        }
    }
}
