//! Cookie-tracking HTTP client for the webmail backend
//!
//! OWA hands out session cookies on redirect responses during login,
//! so reqwest's automatic redirect handling is disabled here: each
//! hop's `Set-Cookie` headers are merged into the store first, then
//! the request is re-issued at the `Location` target with the updated
//! `Cookie` header.

use crate::error::{Error, Result};
use reqwest::header::{COOKIE, HeaderMap, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Per-request timeout, matching the original scraper's 15 second
/// socket default.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Hop limit for manually followed redirects. Form-mode OWA logins
/// chain two redirects before reaching the landing page.
const MAX_REDIRECTS: usize = 5;

/// HTTP client that carries one webmail session: a cookie store and,
/// for the basic-auth backend variant, credentials attached to every
/// request.
pub struct SessionClient {
    client: Client,
    cookies: BTreeMap<String, String>,
    basic_auth: Option<(String, String)>,
}

impl SessionClient {
    /// # Errors
    ///
    /// Returns `Error::Transport` if the underlying client cannot be
    /// constructed.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            cookies: BTreeMap::new(),
            basic_auth: None,
        })
    }

    /// Attach basic-auth credentials to every subsequent request.
    pub fn set_basic_auth(&mut self, username: &str, password: &str) {
        self.basic_auth = Some((username.to_string(), password.to_string()));
    }

    /// GET a page, following redirects and capturing cookies.
    ///
    /// # Errors
    ///
    /// `Error::AuthRequired` on a 401 response, `Error::Retrieval` on
    /// any other non-success status or an unusable redirect, and
    /// `Error::Transport` on connection failures.
    pub async fn get(&mut self, url: &str, extra_headers: &[(&str, &str)]) -> Result<String> {
        self.fetch(Method::GET, url, None, extra_headers).await
    }

    /// POST a form, following redirects and capturing cookies. A
    /// redirect response downgrades the follow-up request to GET.
    ///
    /// # Errors
    ///
    /// Same as [`SessionClient::get`].
    pub async fn post_form(&mut self, url: &str, fields: &[(&str, &str)]) -> Result<String> {
        self.fetch(Method::POST, url, Some(fields), &[]).await
    }

    async fn fetch(
        &mut self,
        method: Method,
        url: &str,
        form: Option<&[(&str, &str)]>,
        extra_headers: &[(&str, &str)],
    ) -> Result<String> {
        let mut url = Url::parse(url)
            .map_err(|e| Error::Retrieval(format!("invalid backend URL {url}: {e}")))?;
        let mut method = method;
        let mut form = form;

        for _ in 0..=MAX_REDIRECTS {
            let mut request = self.client.request(method.clone(), url.clone());
            if let Some((user, pass)) = &self.basic_auth {
                request = request.basic_auth(user, Some(pass));
            }
            if let Some(cookie) = self.cookie_header() {
                request = request.header(COOKIE, cookie);
            }
            for (name, value) in extra_headers {
                request = request.header(*name, *value);
            }
            if let Some(fields) = form {
                request = request.form(fields);
            }

            trace!(%method, %url, "webmail request");
            let response = request.send().await?;

            // Cookies first: a redirect may carry the session cookie
            // the next hop depends on.
            self.capture_cookies(response.headers());

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(Error::AuthRequired);
            }
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| {
                        Error::Retrieval(format!("redirect from {url} without a Location header"))
                    })?;
                let target = url.join(location).map_err(|e| {
                    Error::Retrieval(format!("bad redirect target '{location}': {e}"))
                })?;
                debug!(%target, "following redirect");
                url = target;
                method = Method::GET;
                form = None;
                continue;
            }
            if !status.is_success() {
                return Err(Error::Retrieval(format!(
                    "backend returned {status} for {url}"
                )));
            }
            return Ok(response.text().await?);
        }

        Err(Error::Retrieval(format!("too many redirects fetching {url}")))
    }

    /// Merge every `Set-Cookie` header into the store. Only the
    /// name=value pair is kept; attributes like Path and Expires are
    /// ignored, matching the original scraper.
    fn capture_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or(raw);
            if let Some((name, val)) = pair.split_once('=') {
                trace!(cookie = name.trim(), "captured cookie");
                self.cookies
                    .insert(name.trim().to_string(), val.trim().to_string());
            }
        }
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let serialized = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(serialized)
    }
}
