use std::path::PathBuf;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core
/// can tell fatal startup failures from recoverable runtime ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to persist settings to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the chat server.
///
/// Always recoverable: the sync loop backs off and retries, everything else
/// logs and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Build a status error, keeping only the head of the response body.
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(200).collect(),
        }
    }
}

/// Malformed or unauthorized admin command.
///
/// `Display` is the exact notice shown in the room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{command} command requires arguments")]
    MissingArguments { command: &'static str },

    #[error("{command} command only usable by {required}")]
    Unauthorized {
        command: &'static str,
        required: &'static str,
    },

    #[error("{0}")]
    Usage(&'static str),

    #[error("unknown {command} subcommand: {sub}")]
    UnknownSubcommand { command: &'static str, sub: String },

    #[error("{0} is already whitelisted")]
    DomainExists(String),

    #[error("domain not found in list")]
    DomainNotFound(String),

    #[error("{0} is already a moderator")]
    ModeratorExists(String),

    #[error("{0} is not a moderator")]
    ModeratorNotFound(String),
}
