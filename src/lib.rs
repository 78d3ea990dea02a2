//! POP3 proxy for Outlook Web Access webmail
//!
//! Exposes a legacy OWA account — reachable only through its HTML
//! session interface — as a standard POP3 server, so any mail client
//! can read and delete messages without understanding the webmail
//! HTML.
//!
//! [`WebmailSession`] logs into the backend and scrapes message ids
//! and raw message source out of its pages; [`Pop3Server`] accepts
//! POP3 clients and serves each one from a per-connection
//! [`MailboxSnapshot`] captured right after authentication.

mod command;
mod config;
mod error;
mod http;
mod mailbox;
mod scraper;
mod server;
mod session;

pub use config::{AuthScheme, ProxyConfig};
pub use error::{Error, Result};
pub use http::SessionClient;
pub use mailbox::{MailboxSnapshot, MessageEntry};
pub use scraper::WebmailSession;
pub use server::Pop3Server;
pub use session::{Pop3Session, SessionOutcome};
