//! Fixture data model for the fake OWA backend
//!
//! Builder-style API for constructing backend state:
//!
//! ```ignore
//! let state = BackendBuilder::new()
//!     .credentials("jdoe", "secret")
//!     .message("Inbox/one.EML", "raw message source")
//!     .redirect_login()
//!     .build();
//! ```
//!
//! The state is shared with the running server via `Arc<Mutex<..>>`;
//! tests read the `requests` and `deleted` logs after driving the
//! proxy.

/// A message the fixture serves. `id` is the token the inbox page
/// exposes as a MsgID value, relative to the base reference.
#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub raw: String,
}

/// One request as the fixture saw it, for ordering assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub cookie: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendState {
    pub username: String,
    pub password: String,
    pub messages: Vec<FakeMessage>,
    /// Answer the first login request with a cookie-bearing redirect
    /// back to the landing page.
    pub redirect_login: bool,
    /// Authenticate via the owaauth.dll form instead of basic auth.
    pub form_auth: bool,
    /// Render the landing page without its `<base href>` tag.
    pub broken_landing: bool,
    pub requests: Vec<RecordedRequest>,
    pub deleted: Vec<String>,
}

pub struct BackendBuilder {
    state: BackendState,
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self {
            state: BackendState {
                username: "jdoe".to_string(),
                password: "secret".to_string(),
                messages: Vec::new(),
                redirect_login: false,
                form_auth: false,
                broken_landing: false,
                requests: Vec::new(),
                deleted: Vec::new(),
            },
        }
    }

    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.state.username = username.to_string();
        self.state.password = password.to_string();
        self
    }

    pub fn message(mut self, id: &str, raw: &str) -> Self {
        self.state.messages.push(FakeMessage {
            id: id.to_string(),
            raw: raw.to_string(),
        });
        self
    }

    pub fn redirect_login(mut self) -> Self {
        self.state.redirect_login = true;
        self
    }

    pub fn form_auth(mut self) -> Self {
        self.state.form_auth = true;
        self
    }

    pub fn broken_landing(mut self) -> Self {
        self.state.broken_landing = true;
        self
    }

    pub fn build(self) -> BackendState {
        self.state
    }
}
