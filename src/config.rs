//! Configuration module for the mail relay.
//!
//! Everything is read from the environment once at startup; the handler only
//! ever sees the resulting immutable [`Config`].

/// Struct containing all configuration options.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_to_stdout: bool,
    pub log_dir: String,
    pub log_file: String,
    pub listen_addr: String,
    pub listen_port: u16,
    /// Shared secret for the `x-service-token` gate, trimmed. May be empty
    /// when the deployment forgot to set it; the handler reports that as 500.
    pub service_token: String,
    pub smtp: SmtpConfig,
    pub transport: String,
    pub outbox_dir: String,
}

/// SMTP connection parameters, all caller-independent.
///
/// Fields are kept as read (trimmed strings, port may be 0 when unset or
/// unparseable) so that an incomplete deployment is detected per request
/// rather than crashing at startup.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub user: String,
    pub pass: String,
    pub from: String,
}

impl SmtpConfig {
    /// True when every parameter needed to open a connection is present.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty()
            && self.port > 0
            && !self.user.is_empty()
            && !self.pass.is_empty()
            && !self.from.is_empty()
    }
}

/// Read a trimmed environment variable, falling back to `default`.
fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v.trim() == "true",
        Err(_) => default,
    }
}

impl Config {
    /// Build the full configuration from environment variables.
    ///
    /// # Environment Variables:
    /// |Variable|Description|
    /// |:------:|:---------:|
    /// |`MAIL_SERVICE_TOKEN`|Shared secret required in the `x-service-token` header|
    /// |`SMTP_HOST`|SMTP server hostname (e.g. `smtp.example.com`)|
    /// |`SMTP_PORT`|SMTP server port (e.g. `587`)|
    /// |`SMTP_SECURE`|`true` for implicit TLS, anything else for STARTTLS|
    /// |`SMTP_USER`|SMTP username for authentication|
    /// |`SMTP_PASS`|SMTP password for authentication|
    /// |`SMTP_FROM`|Sender address (e.g. `noreply@example.com`)|
    /// |`MAIL_TRANSPORT`|Delivery transport (`smtp` or `file`)|
    /// |`MAIL_FILE_DIR`|Directory to store emails when using `file` transport|
    /// |`LISTEN_ADDR`|Address to bind to (e.g. `127.0.0.1`)|
    /// |`LISTEN_PORT`|Port to bind to (e.g. `8080`)|
    /// |`LOG_LEVEL`|Log level (DEBUG, INFO, WARN, ERROR)|
    /// |`LOG_TO_FILE`|Whether to log to file (true/false)|
    /// |`LOG_TO_STDOUT`|Whether to log to stdout (true/false)|
    /// |`LOG_DIR`|Directory to log to (relative to executable)|
    /// |`LOG_FILE`|File to log to (relative to `LOG_DIR`)|
    ///
    /// Missing SMTP values do not fail here; the handler answers
    /// `500 SMTP config missing` until the deployment is fixed. A missing
    /// `MAIL_SERVICE_TOKEN` likewise surfaces as a per-request 500.
    pub fn from_env() -> Config {
        let smtp = SmtpConfig {
            host: env_or("SMTP_HOST", ""),
            port: env_or("SMTP_PORT", "0").parse().unwrap_or(0),
            secure: env_bool("SMTP_SECURE", false),
            user: env_or("SMTP_USER", ""),
            pass: env_or("SMTP_PASS", ""),
            from: env_or("SMTP_FROM", ""),
        };
        Config {
            log_level: env_or("LOG_LEVEL", "INFO"),
            log_to_file: env_bool("LOG_TO_FILE", false),
            log_to_stdout: env_bool("LOG_TO_STDOUT", true),
            log_dir: env_or("LOG_DIR", "logs"),
            log_file: env_or("LOG_FILE", "relay.log"),
            listen_addr: env_or("LISTEN_ADDR", "127.0.0.1"),
            listen_port: env_or("LISTEN_PORT", "8080").parse().unwrap_or(8080),
            service_token: env_or("MAIL_SERVICE_TOKEN", ""),
            smtp,
            transport: env_or("MAIL_TRANSPORT", "smtp").to_lowercase(),
            outbox_dir: env_or("MAIL_FILE_DIR", "outbox"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            secure: false,
            user: "mailer".into(),
            pass: "hunter2".into(),
            from: "noreply@example.com".into(),
        }
    }

    #[test]
    fn complete_config_passes() {
        assert!(complete().is_complete());
    }

    #[test]
    fn any_missing_field_fails() {
        let mut c = complete();
        c.host = String::new();
        assert!(!c.is_complete());

        let mut c = complete();
        c.port = 0;
        assert!(!c.is_complete());

        let mut c = complete();
        c.user = String::new();
        assert!(!c.is_complete());

        let mut c = complete();
        c.pass = String::new();
        assert!(!c.is_complete());

        let mut c = complete();
        c.from = String::new();
        assert!(!c.is_complete());
    }
}
