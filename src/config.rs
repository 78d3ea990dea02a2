//! Proxy configuration

use crate::error::{Error, Result};
use std::env;

/// How the backend expects credentials to be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// HTTP basic authentication on every request (classic OWA).
    Basic,
    /// Credential-bearing POST to the OWA auth form.
    Form,
}

impl AuthScheme {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "form" => Ok(Self::Form),
            other => Err(Error::Config(format!(
                "Invalid OWA_AUTH '{other}' (expected 'basic' or 'form')"
            ))),
        }
    }
}

/// Runtime configuration for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Backend authority, e.g. `https://mail.example.com`. Stored
    /// without a trailing slash.
    pub backend_url: String,
    pub auth: AuthScheme,
    /// Prepended to every username a client supplies, e.g. `DOMAIN\`.
    pub login_prefix: Option<String>,
    pub listen_host: String,
    pub listen_port: u16,
    /// Name announced in the POP3 greeting line.
    pub hostname: String,
    /// Serve exactly one POP3 session, then stop accepting.
    pub serve_once: bool,
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads from `.env` if present. Required variables:
    /// - `OWA_BACKEND_URL`
    ///
    /// Optional (with defaults):
    /// - `OWA_AUTH` (default: `basic`)
    /// - `OWA_LOGIN_PREFIX`
    /// - `POP3_LISTEN_HOST` (default: `127.0.0.1`)
    /// - `POP3_LISTEN_PORT` (default: `8110`)
    /// - `POP3_HOSTNAME` (default: `localhost`)
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a required variable is missing or
    /// a value does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            backend_url: env::var("OWA_BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .map_err(|_| Error::Config("OWA_BACKEND_URL not set".into()))?,
            auth: match env::var("OWA_AUTH") {
                Ok(value) => AuthScheme::parse(&value)?,
                Err(_) => AuthScheme::Basic,
            },
            login_prefix: env::var("OWA_LOGIN_PREFIX").ok(),
            listen_host: env::var("POP3_LISTEN_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            listen_port: env::var("POP3_LISTEN_PORT")
                .unwrap_or_else(|_| "8110".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid POP3_LISTEN_PORT: {e}")))?,
            hostname: env::var("POP3_HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            serve_once: false,
        })
    }
}
