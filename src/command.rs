//! POP3 command parsing
//!
//! Each client line is split into an upper-cased command token and an
//! optional argument (everything after the first space, trimmed). The
//! recognized set is a closed enum instead of name-based dispatch, so
//! unknown tokens fall through to a single place and the whole
//! command table is visible here.

/// A parsed client command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(Option<String>),
    /// The password, empty when the client sent a bare PASS.
    Pass(String),
    Stat,
    List(Option<String>),
    Uidl(Option<String>),
    Retr(Option<String>),
    Quit,
    /// Unrecognized command token, upper-cased for the error reply.
    Unknown(String),
    /// An empty line.
    Empty,
}

/// Parse one client line, with the CRLF terminator already stripped.
#[must_use]
pub fn parse(line: &str) -> Command {
    if line.is_empty() {
        return Command::Empty;
    }

    let (token, rest) = match line.split_once(' ') {
        Some((token, rest)) => (token, Some(rest.trim())),
        None => (line, None),
    };
    let arg = rest
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    match token.to_ascii_uppercase().as_str() {
        "USER" => Command::User(arg),
        "PASS" => Command::Pass(arg.unwrap_or_default()),
        "STAT" => Command::Stat,
        "LIST" => Command::List(arg),
        "UIDL" => Command::Uidl(arg),
        "RETR" => Command::Retr(arg),
        "QUIT" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}
