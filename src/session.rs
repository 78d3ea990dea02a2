//! Per-connection POP3 session state machine
//!
//! One instance per accepted client. Reads CRLF-terminated command
//! lines, answers with `+OK`/`-ERR` lines, and moves between two
//! states: unauthenticated (USER/PASS) and transaction
//! (STAT/LIST/UIDL/RETR). The transaction state owns this
//! connection's webmail session and mailbox snapshot; nothing is
//! shared across connections.

use crate::command::{self, Command};
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::mailbox::MailboxSnapshot;
use crate::scraper::WebmailSession;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

const SERVER_VERSION: &str = concat!(
    "Outlook Web Access POP3 proxy ",
    env!("CARGO_PKG_VERSION")
);

/// How a session ended, as far as the accept loop cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client completed a QUIT. The only outcome that stops the
    /// server in serve-once mode.
    Quit,
    /// The client went away without QUIT.
    Disconnected,
}

enum SessionState {
    Unauthenticated {
        username: Option<String>,
    },
    Transaction {
        webmail: WebmailSession,
        snapshot: MailboxSnapshot,
    },
}

enum Flow {
    Continue,
    Quit,
}

#[derive(Clone, Copy)]
enum Listing {
    Sizes,
    Uids,
}

impl Listing {
    const fn name(self) -> &'static str {
        match self {
            Self::Sizes => "LIST",
            Self::Uids => "UIDL",
        }
    }
}

/// One POP3 client connection.
///
/// Generic over the stream so tests can drive it through an in-memory
/// duplex pipe.
pub struct Pop3Session<S> {
    stream: BufReader<S>,
    config: Arc<ProxyConfig>,
    state: SessionState,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Pop3Session<S> {
    pub fn new(stream: S, config: Arc<ProxyConfig>) -> Self {
        Self {
            stream: BufReader::new(stream),
            config,
            state: SessionState::Unauthenticated { username: None },
        }
    }

    /// Drive the session to completion.
    ///
    /// Protocol-level problems (bad syntax, unknown commands, wrong
    /// state, out-of-range messages) are answered inline with `-ERR`
    /// lines and the loop continues. Only backend failures and broken
    /// sockets surface as `Err`, and those tear down just this
    /// connection.
    ///
    /// # Errors
    ///
    /// `Error::Io` on socket failures; webmail errors from the eager
    /// snapshot fetch or RETR-triggered deletion.
    pub async fn run(mut self) -> Result<SessionOutcome> {
        let greeting = format!("+OK {} {SERVER_VERSION}", self.config.hostname);
        self.send_line(&greeting).await?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.stream.read_line(&mut line).await? == 0 {
                debug!("client disconnected");
                return Ok(SessionOutcome::Disconnected);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            match self.dispatch(command::parse(trimmed)).await? {
                Flow::Continue => {}
                Flow::Quit => return Ok(SessionOutcome::Quit),
            }
        }
    }

    async fn dispatch(&mut self, cmd: Command) -> Result<Flow> {
        match cmd {
            Command::User(arg) => self.cmd_user(arg).await?,
            Command::Pass(password) => self.cmd_pass(password).await?,
            Command::Stat => self.cmd_stat().await?,
            Command::List(arg) => self.cmd_listing(arg, Listing::Sizes).await?,
            Command::Uidl(arg) => self.cmd_listing(arg, Listing::Uids).await?,
            Command::Retr(arg) => self.cmd_retr(arg).await?,
            Command::Quit => {
                self.send_line("+OK Goodbye").await?;
                info!("session closed by QUIT");
                return Ok(Flow::Quit);
            }
            Command::Unknown(token) => {
                let reply = format!("-ERR Error : command \"{token}\" not implemented");
                self.send_line(&reply).await?;
            }
            Command::Empty => self.send_line("500 Error: bad syntax").await?,
        }
        Ok(Flow::Continue)
    }

    async fn cmd_user(&mut self, arg: Option<String>) -> Result<()> {
        let reply = match &mut self.state {
            SessionState::Transaction { .. } => "-ERR already authenticated".to_string(),
            SessionState::Unauthenticated { .. } if arg.is_none() => {
                "-ERR Syntax: USER username".to_string()
            }
            SessionState::Unauthenticated { username } => {
                let name = arg.unwrap_or_default();
                let full = self
                    .config
                    .login_prefix
                    .as_deref()
                    .map_or_else(|| name.clone(), |prefix| format!("{prefix}{name}"));
                *username = Some(full);
                "+OK Password required".to_string()
            }
        };
        self.send_line(&reply).await
    }

    async fn cmd_pass(&mut self, password: String) -> Result<()> {
        let username = match &self.state {
            SessionState::Transaction { .. } => {
                return self.send_line("-ERR already authenticated").await;
            }
            SessionState::Unauthenticated { username: None } => {
                return self.send_line("-ERR USER required first").await;
            }
            SessionState::Unauthenticated {
                username: Some(name),
            } => name.clone(),
        };

        let mut webmail = WebmailSession::new(
            &self.config.backend_url,
            self.config.auth,
            &username,
            &password,
        )?;

        match webmail.login().await {
            Ok(()) => {}
            Err(Error::InvalidLogin) => {
                warn!(username = username.as_str(), "backend rejected login");
                return self
                    .send_line("-ERR Login failed. (Wrong username/password?)")
                    .await;
            }
            Err(other) => return Err(other),
        }

        self.send_line("+OK User logged in").await?;

        // Eager fetch: list the inbox and pull every body now, so all
        // later reads are served from memory. The only backend call
        // after this point is deletion.
        let ids = webmail.inbox().await?;
        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let body = webmail.get_message(&id).await?;
            messages.push((id, body));
        }
        let snapshot = MailboxSnapshot::new(messages);
        info!(
            count = snapshot.len(),
            octets = snapshot.total_octets(),
            "mailbox snapshot ready"
        );
        self.state = SessionState::Transaction { webmail, snapshot };
        Ok(())
    }

    async fn cmd_stat(&mut self) -> Result<()> {
        let reply = match &self.state {
            SessionState::Transaction { snapshot, .. } => {
                format!("+OK {} {}", snapshot.len(), snapshot.total_octets())
            }
            SessionState::Unauthenticated { .. } => "-ERR not authenticated".to_string(),
        };
        self.send_line(&reply).await
    }

    async fn cmd_listing(&mut self, arg: Option<String>, kind: Listing) -> Result<()> {
        if arg.is_some() {
            // The single-message form is deliberately unsupported;
            // fail loudly rather than mis-respond.
            let reply = format!("-ERR per-message {} is not supported", kind.name());
            return self.send_line(&reply).await;
        }

        let lines: Vec<String> = match &self.state {
            SessionState::Unauthenticated { .. } => {
                return self.send_line("-ERR not authenticated").await;
            }
            SessionState::Transaction { snapshot, .. } => snapshot
                .iter()
                .enumerate()
                .map(|(index, entry)| match kind {
                    Listing::Sizes => format!("{} {}", index + 1, entry.octets()),
                    Listing::Uids => format!("{} {}", index + 1, entry.uidl()),
                })
                .collect(),
        };

        self.send_line("+OK").await?;
        for line in &lines {
            self.send_line(line).await?;
        }
        self.send_line(".").await
    }

    async fn cmd_retr(&mut self, arg: Option<String>) -> Result<()> {
        let Some(number) = arg.as_deref().and_then(|value| value.parse::<usize>().ok()) else {
            return self.send_line("-ERR Syntax: RETR msg").await;
        };

        let (lines, msg_id) = match &self.state {
            SessionState::Unauthenticated { .. } => {
                return self.send_line("-ERR not authenticated").await;
            }
            SessionState::Transaction { snapshot, .. } => match snapshot.get(number) {
                None => return self.send_line("-ERR no such message").await,
                Some(entry) => (dot_stuffed_lines(entry.body()), entry.id().to_string()),
            },
        };

        self.send_line("+OK").await?;
        for line in &lines {
            self.send_line(line).await?;
        }
        self.send_line(".").await?;

        // The message is deleted remotely only after the full body has
        // been served, and at most once per entry; the snapshot keeps
        // its slot so numbering never shifts.
        if let SessionState::Transaction { webmail, snapshot } = &mut self.state {
            if snapshot.mark_delete_requested(number) {
                webmail.delete_message(&msg_id).await?;
            }
        }
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream.get_mut().write_all(line.as_bytes()).await?;
        self.stream.get_mut().write_all(b"\r\n").await?;
        self.stream.get_mut().flush().await?;
        Ok(())
    }
}

/// Body rendering for RETR: leading whitespace stripped, split into
/// lines, any line starting with `.` escaped by doubling it so the
/// lone-dot terminator stays unambiguous.
fn dot_stuffed_lines(body: &str) -> Vec<String> {
    body.trim_start().lines().map(stuff_dots).collect()
}

fn stuff_dots(line: &str) -> String {
    if line.starts_with('.') {
        format!(".{line}")
    } else {
        line.to_string()
    }
}
