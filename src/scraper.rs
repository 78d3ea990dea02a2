//! Outlook Web Access screen scraper
//!
//! Logs into an OWA account and pulls message ids and raw message
//! source out of the HTML pages the backend renders. OWA has no
//! structured API, so folder contents and the post-login base
//! reference are pattern-matched out of the markup.

use crate::config::AuthScheme;
use crate::error::{Error, Result};
use crate::http::SessionClient;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Marker OWA renders on the login page when credentials are refused.
const LOGIN_FAILED_MARKER: &str = "You could not be logged on to Outlook Web Access";

/// Form-based login endpoint, relative to the backend authority.
const FORM_LOGIN_PATH: &str = "/exchweb/bin/auth/owaauth.dll";

static BASE_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<BASE href="([^"]*)">"#).expect("valid regex"));

static MSG_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)NAME=MsgID value="([^"]*)""#).expect("valid regex"));

/// One authenticated webmail session.
///
/// Two states: not-logged-in and logged-in. The only transition is
/// [`WebmailSession::login`], fired explicitly or implicitly by the
/// first data-access call. `base_href` is the path prefix discovered
/// on the post-login page; every folder and message URL is built from
/// it.
pub struct WebmailSession {
    http: SessionClient,
    backend_url: String,
    auth: AuthScheme,
    username: String,
    password: String,
    logged_in: bool,
    base_href: Option<String>,
}

impl WebmailSession {
    /// # Errors
    ///
    /// Returns `Error::Transport` if the HTTP client cannot be built.
    pub fn new(
        backend_url: &str,
        auth: AuthScheme,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let mut http = SessionClient::new()?;
        if auth == AuthScheme::Basic {
            http.set_basic_auth(username, password);
        }

        Ok(Self {
            http,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            auth,
            username: username.to_string(),
            password: password.to_string(),
            logged_in: false,
            base_href: None,
        })
    }

    /// Authenticate against the backend and discover the base
    /// reference.
    ///
    /// # Errors
    ///
    /// `Error::InvalidLogin` when the backend refuses the credentials
    /// (the session stays usable for a retry), `Error::Retrieval` when
    /// the post-login page carries no `<base href>`, and transport
    /// errors from the HTTP layer.
    pub async fn login(&mut self) -> Result<()> {
        let destination = format!("{}/exchange/", self.backend_url);

        let fetched = match self.auth {
            AuthScheme::Basic => self.http.get(&destination, &[]).await,
            AuthScheme::Form => {
                let login_url = format!("{}{FORM_LOGIN_PATH}", self.backend_url);
                let form = [
                    ("destination", destination.as_str()),
                    ("flags", "0"),
                    ("username", self.username.as_str()),
                    ("password", self.password.as_str()),
                    ("forcedownlevel", "0"),
                    ("trusted", "0"),
                ];
                self.http.post_form(&login_url, &form).await
            }
        };

        // A 401 during the login exchange means the credentials were
        // refused, not that an established session lacks auth.
        let html = match fetched {
            Err(Error::AuthRequired) => return Err(Error::InvalidLogin),
            other => other?,
        };

        if html.contains(LOGIN_FAILED_MARKER) {
            return Err(Error::InvalidLogin);
        }

        let base_href = extract_base_href(&html).ok_or_else(|| {
            Error::Retrieval("no <base href> on the page after logging in".into())
        })?;

        info!(%base_href, "logged in to webmail backend");
        self.base_href = Some(base_href);
        self.logged_in = true;
        Ok(())
    }

    /// Message ids on the first page of the Inbox.
    ///
    /// # Errors
    ///
    /// Same as [`WebmailSession::list_folder`].
    pub async fn inbox(&mut self) -> Result<Vec<String>> {
        self.list_folder("Inbox").await
    }

    /// Message ids on the first page of the named folder, in the
    /// backend's default sort order. The backend folds folder-name
    /// case itself.
    ///
    /// # Errors
    ///
    /// Logs in first if needed; backend errors bubble up.
    pub async fn list_folder(&mut self, folder_name: &str) -> Result<Vec<String>> {
        let base_href = self.ensure_logged_in().await?;
        let url = format!(
            "{base_href}{}/?Cmd=contents",
            urlencoding::encode(folder_name)
        );
        let html = self.http.get(&url, &[]).await?;
        let ids = extract_message_ids(&html);
        debug!(folder = folder_name, count = ids.len(), "listed folder");
        Ok(ids)
    }

    /// Raw source of a message, with full headers. The `Translate: f`
    /// header tells OWA to return the untranslated message instead of
    /// a rendered view.
    ///
    /// # Errors
    ///
    /// Logs in first if needed; backend errors bubble up.
    pub async fn get_message(&mut self, msg_id: &str) -> Result<String> {
        let base_href = self.ensure_logged_in().await?;
        let url = format!("{base_href}{msg_id}?Cmd=body");
        self.http.get(&url, &[("Translate", "f")]).await
    }

    /// Ask the backend to delete a message (OWA moves it to Deleted
    /// Items).
    ///
    /// # Errors
    ///
    /// Logs in first if needed; backend errors bubble up.
    pub async fn delete_message(&mut self, msg_id: &str) -> Result<()> {
        let base_href = self.ensure_logged_in().await?;
        let url = format!("{base_href}{msg_id}");
        self.http
            .post_form(
                &url,
                &[("MsgId", msg_id), ("Cmd", "delete"), ("ReadForm", "1")],
            )
            .await?;
        debug!(msg_id, "requested deletion");
        Ok(())
    }

    async fn ensure_logged_in(&mut self) -> Result<String> {
        if !self.logged_in {
            self.login().await?;
        }
        self.base_href
            .clone()
            .ok_or_else(|| Error::Retrieval("logged in without a base reference".into()))
    }
}

fn extract_base_href(html: &str) -> Option<String> {
    BASE_HREF_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_message_ids(html: &str) -> Vec<String> {
    MSG_ID_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
