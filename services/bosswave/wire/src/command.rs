//! Frame commands.
//!
//! Every frame opens with a four byte command token. Tokens outside the known
//! set still parse, as [`Command::Other`], so that newer routers can introduce
//! commands without breaking older clients.

use std::fmt;

/// Length of a command token on the wire
pub const COMMAND_LEN: usize = 4;

/// Frame commands as defined by the out-of-band protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Router handshake acknowledgment (receive only)
    Hello,
    /// Publish a message
    Publish,
    /// Publish a message and persist it on the router
    Persist,
    /// Subscribe to a URI pattern
    Subscribe,
    /// List the children of a URI
    List,
    /// Single status reply to any request
    Response,
    /// One streamed item for a subscribe or list request
    Result,
    /// Syntactically valid token this client does not know about
    Other([u8; COMMAND_LEN]),
}

impl Command {
    /// Wire token for this command
    pub fn token(&self) -> [u8; COMMAND_LEN] {
        match self {
            Command::Hello => *b"helo",
            Command::Publish => *b"publ",
            Command::Persist => *b"pers",
            Command::Subscribe => *b"subs",
            Command::List => *b"list",
            Command::Response => *b"resp",
            Command::Result => *b"rslt",
            Command::Other(token) => *token,
        }
    }

    /// Parse a command token.
    ///
    /// Returns `None` when the token is not four ASCII alphanumeric bytes.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        let token: [u8; COMMAND_LEN] = token.try_into().ok()?;
        if !token.iter().all(u8::is_ascii_alphanumeric) {
            return None;
        }

        Some(match &token {
            b"helo" => Command::Hello,
            b"publ" => Command::Publish,
            b"pers" => Command::Persist,
            b"subs" => Command::Subscribe,
            b"list" => Command::List,
            b"resp" => Command::Response,
            b"rslt" => Command::Result,
            _ => Command::Other(token),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are validated ASCII, so this never loses bytes.
        f.write_str(&String::from_utf8_lossy(&self.token()))
    }
}
