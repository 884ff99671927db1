use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol participant (`@user:domain`).
///
/// Compared by exact, case-sensitive string match. No normalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

/// Room id (string), scoping every send/join.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

/// Server-assigned event id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventId(pub String);

/// Opaque position in the event stream, as returned by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncCursor(pub String);

macro_rules! impl_token {
    ($($ty:ident),*) => {$(
        impl $ty {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

impl_token!(Identity, RoomId, EventId, SyncCursor);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Invite,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgType {
    Text,
    Notice,
}

/// A decoded room event. Immutable once received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub sender: Identity,
    pub room_id: RoomId,
    pub kind: EventKind,
    pub body: Option<String>,
    pub msg_type: Option<MsgType>,
}

impl Event {
    /// Body of a message event, if it carries one.
    pub fn message_body(&self) -> Option<&str> {
        match self.kind {
            EventKind::Message => self.body.as_deref(),
            _ => None,
        }
    }
}
