//! In-process fake OWA backend for integration testing
//!
//! Speaks just enough HTTP and renders just enough OWA-shaped HTML to
//! exercise the proxy end to end:
//!
//! - the login landing page with its `<base href>` tag, behind either
//!   basic auth or the owaauth.dll form, optionally reached through a
//!   cookie-bearing redirect hop
//! - folder contents pages with `NAME=MsgID value="…"` entries
//! - raw message bodies for `?Cmd=body` requests
//! - deletion postbacks (`Cmd=delete`), recorded for assertions

use super::http::{Request, Response, read_request, write_response};
use super::state::{BackendState, RecordedRequest};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tokio::net::TcpListener;

/// The session cookie handed out by login redirects.
const SESSION_COOKIE: &str = "sessionid=fixture-session";

/// A fake OWA backend on localhost with an OS-assigned port.
///
/// Runs until dropped (the accept task is aborted with the handle).
pub struct FakeOwaServer {
    port: u16,
    state: Arc<Mutex<BackendState>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeOwaServer {
    /// Start a fake backend with the given fixture state.
    pub async fn start(state: BackendState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(state));

        let shared = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let shared = shared.clone();
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    let Ok(Some(request)) = read_request(&mut reader).await else {
                        return;
                    };
                    let response = route(&shared, port, &request);
                    let _ = write_response(&mut reader, &response).await;
                });
            }
        });

        Self {
            port,
            state,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Message ids submitted for deletion, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

fn route(shared: &Arc<Mutex<BackendState>>, port: u16, request: &Request) -> Response {
    let mut state = shared.lock().unwrap();
    state.requests.push(RecordedRequest {
        method: request.method.clone(),
        target: request.target.clone(),
        cookie: request.header("cookie").map(str::to_string),
        authorization: request.header("authorization").map(str::to_string),
    });

    let base = format!("http://127.0.0.1:{port}");

    // Form-mode login endpoint.
    if state.form_auth && request.method == "POST" && request.target == "/exchweb/bin/auth/owaauth.dll"
    {
        let fields = parse_form(&request.body);
        let user_ok = fields.get("username").is_some_and(|v| *v == state.username);
        let pass_ok = fields.get("password").is_some_and(|v| *v == state.password);
        if user_ok && pass_ok {
            return Response::redirect(format!("{base}/exchange/")).with_cookie(SESSION_COOKIE);
        }
        return Response::ok(login_failed_page());
    }

    // The login landing page.
    if request.method == "GET" && (request.target == "/exchange/" || request.target == "/exchange")
    {
        if state.form_auth {
            if has_session_cookie(request) {
                return Response::ok(landing_page(&base, &state));
            }
            return Response::ok(login_failed_page());
        }
        if !basic_auth_ok(request, &state.username, &state.password) {
            return Response::unauthorized();
        }
        if state.redirect_login && !has_session_cookie(request) {
            return Response::redirect(format!("{base}/exchange/")).with_cookie(SESSION_COOKIE);
        }
        return Response::ok(landing_page(&base, &state));
    }

    // Everything else lives under the per-user base reference.
    let user_root = format!("/exchange/{}/", state.username);
    let Some(rest) = request.target.strip_prefix(user_root.as_str()) else {
        return Response::not_found();
    };
    if !state.form_auth && !basic_auth_ok(request, &state.username, &state.password) {
        return Response::unauthorized();
    }

    if request.method == "GET" {
        if let Some(folder) = rest.strip_suffix("/?Cmd=contents") {
            return folder_page(&state, folder);
        }
        if let Some(id) = rest.strip_suffix("?Cmd=body") {
            return match state.messages.iter().find(|m| m.id == id) {
                Some(message) => Response::ok(message.raw.clone()),
                None => Response::not_found(),
            };
        }
    }

    // Deletion postback: POST {id} with a Cmd=delete form.
    if request.method == "POST" {
        let fields = parse_form(&request.body);
        if fields.get("Cmd").map(String::as_str) == Some("delete") {
            if let Some(id) = fields.get("MsgId") {
                state.deleted.push(id.clone());
                return Response::ok("deleted");
            }
        }
    }

    Response::not_found()
}

fn landing_page(base: &str, state: &BackendState) -> String {
    if state.broken_landing {
        return "<html><head><title>Microsoft Outlook Web Access</title></head>\n\
                <body>Inbox</body></html>"
            .to_string();
    }
    format!(
        "<html><head><title>Microsoft Outlook Web Access</title>\n\
         <BASE href=\"{base}/exchange/{}/\"></head>\n\
         <body>Inbox</body></html>",
        state.username
    )
}

fn login_failed_page() -> String {
    "<html><body>You could not be logged on to Outlook Web Access. \
     Please check your credentials and retry.</body></html>"
        .to_string()
}

fn folder_page(state: &BackendState, folder: &str) -> Response {
    let prefix = format!("{}/", folder.to_ascii_lowercase());
    let rows: String = state
        .messages
        .iter()
        .filter(|message| message.id.to_ascii_lowercase().starts_with(&prefix))
        .map(|message| {
            format!(
                "<tr><td><input type=\"checkbox\" NAME=MsgID value=\"{}\"></td></tr>\n",
                message.id
            )
        })
        .collect();
    Response::ok(format!(
        "<html><body><table>\n{rows}</table></body></html>"
    ))
}

fn basic_auth_ok(request: &Request, username: &str, password: &str) -> bool {
    let expected = format!("Basic {}", STANDARD.encode(format!("{username}:{password}")));
    request.header("authorization") == Some(expected.as_str())
}

fn has_session_cookie(request: &Request) -> bool {
    request
        .header("cookie")
        .is_some_and(|cookie| cookie.contains(SESSION_COOKIE))
}

fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(name, value)| {
            let name = urlencoding::decode(name).ok()?;
            let value = urlencoding::decode(value).ok()?;
            Some((name.into_owned(), value.into_owned()))
        })
        .collect()
}
