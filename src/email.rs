//! Mail transport state, message assembly and delivery.

use std::time::Duration;

use lettre::{
    message::{header, Mailbox, SinglePart},
    transport::file::AsyncFileTransport,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::routes::MailRequest;

/// Transport selected at startup (SMTP for prod, FILE for local dev).
#[derive(Clone)]
pub enum Mailer {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl Mailer {
    /// Unified `send` so callers don't care which transport we're using.
    /// We normalize errors to String to avoid mixing different transport
    /// error types, and always come back with a message id.
    pub async fn send(&self, email: Message) -> Result<String, String> {
        match self {
            Mailer::Smtp(m) => m
                .send(email)
                .await
                .map(|r| {
                    // The relay usually answers "250 2.0.0 OK <queue-id>";
                    // keep that as the id, or fall back to a generated one.
                    let line = r.message().next().map(str::to_string).unwrap_or_default();
                    if line.is_empty() { nanoid() } else { line }
                })
                .map_err(|e| e.to_string()),
            Mailer::File(f) => f.send(email).await.map(|_| nanoid()).map_err(|e| e.to_string()),
        }
    }
}

/// Errors on the delivery path. Everything here is answered to the caller as
/// a generic `502 SMTP failed`; the detail only goes to the server log.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("message build error: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Immutable per-process state shared with the handler.
#[derive(Clone)]
pub struct RelayState {
    /// Trimmed shared secret; empty means the deployment never set one.
    pub service_token: String,
    /// Configured sender address, as read. Parsed into a `Mailbox` at send
    /// time so a bad value surfaces on the delivery path, like any other
    /// provider-side problem.
    pub from: String,
    /// `None` when the SMTP configuration is incomplete; the handler reports
    /// that as `500 SMTP config missing` on every request.
    pub mailer: Option<Mailer>,
}

impl RelayState {
    /// Build the shared state from the loaded configuration.
    ///
    /// An incomplete SMTP configuration leaves `mailer` unset instead of
    /// failing startup, so the operator sees a stable HTTP error rather
    /// than a crash loop.
    pub fn from_config(config: &Config) -> Self {
        let mailer = if config.transport == "file" {
            build_file_mailer(&config.outbox_dir)
        } else if config.smtp.is_complete() {
            build_smtp_mailer(config)
        } else {
            warn!("SMTP configuration incomplete, /send will answer 500 until it is fixed");
            None
        };
        Self {
            service_token: config.service_token.clone(),
            from: config.smtp.from.clone(),
            mailer,
        }
    }
}

/// Build the SMTP transport with creds and a short timeout.
/// `SMTP_SECURE=true` means implicit TLS on connect; anything else upgrades
/// via STARTTLS.
fn build_smtp_mailer(config: &Config) -> Option<Mailer> {
    use lettre::transport::smtp::authentication::Credentials;

    let smtp = &config.smtp;
    let builder = if smtp.secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
    };
    let builder = match builder {
        Ok(b) => b,
        Err(e) => {
            warn!("unusable SMTP host {:?}: {e}", smtp.host);
            return None;
        }
    };
    let creds = Credentials::new(smtp.user.clone(), smtp.pass.clone());
    Some(Mailer::Smtp(
        builder
            .port(smtp.port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(15)))
            .build(),
    ))
}

/// Build a file transport (writes `.eml` files), used for local/dev.
fn build_file_mailer(dir: &str) -> Option<Mailer> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("cannot create outbox dir {dir:?}: {e}");
        return None;
    }
    Some(Mailer::File(AsyncFileTransport::new(
        std::path::Path::new(dir).to_path_buf(),
    )))
}

/// Assemble the outgoing message: configured sender, caller-supplied
/// recipient and subject, and a single body part that is HTML or plain text,
/// never both.
pub fn build_message(from: &str, req: &MailRequest) -> Result<Message, DispatchError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| DispatchError::Build(format!("invalid sender: {e}")))?;
    // The recipient already matched the address shape check, but the
    // mailbox grammar is stricter; a miss here is a delivery failure.
    let to: Mailbox = req
        .to
        .parse()
        .map_err(|e| DispatchError::Build(format!("invalid recipient: {e}")))?;

    let content_type = if req.is_html {
        header::ContentType::TEXT_HTML
    } else {
        header::ContentType::TEXT_PLAIN
    };

    Message::builder()
        .from(from)
        .to(to)
        .subject(&req.subject)
        .singlepart(
            SinglePart::builder()
                .header(content_type)
                .body(req.content.clone()),
        )
        .map_err(|e| DispatchError::Build(e.to_string()))
}

/// Deliver one validated request over the given transport, exactly once.
pub async fn dispatch(
    mailer: &Mailer,
    from: &str,
    req: &MailRequest,
) -> Result<String, DispatchError> {
    let email = build_message(from, req)?;
    mailer.send(email).await.map_err(DispatchError::Transport)
}

/// Generate a compact pseudo message id (22 chars, URL-safe).
fn nanoid() -> String {
    use rand::{distr::Alphanumeric, rng, Rng};
    rng()
        .sample_iter(&Alphanumeric)
        .take(22)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(is_html: bool) -> MailRequest {
        MailRequest {
            to: "user@example.com".into(),
            subject: "Hi".into(),
            content: if is_html { "<b>hi</b>".into() } else { "plain text".into() },
            is_html,
        }
    }

    #[test]
    fn html_request_builds_html_body() {
        let msg = build_message("noreply@example.com", &request(true)).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(!raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("Subject: Hi"));
    }

    #[test]
    fn plain_request_builds_text_body() {
        let msg = build_message("noreply@example.com", &request(false)).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(!raw.contains("Content-Type: text/html"));
    }

    #[test]
    fn unparseable_sender_is_a_build_error() {
        let err = build_message("not a mailbox", &request(true)).unwrap_err();
        assert!(matches!(err, DispatchError::Build(_)));
    }

    #[test]
    fn recipient_past_shape_check_can_still_miss_mailbox_grammar() {
        let mut req = request(true);
        // Passes the lenient shape check but not the mailbox grammar.
        req.to = "a,b@example.com".into();
        assert!(build_message("noreply@example.com", &req).is_err());
    }

    #[test]
    fn nanoid_is_22_alphanumeric_chars() {
        let id = nanoid();
        assert_eq!(id.len(), 22);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
