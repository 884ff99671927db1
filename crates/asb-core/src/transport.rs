use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{Event, MsgType, RoomId, SyncCursor},
    errors::TransportError,
};

/// One long-poll response.
#[derive(Clone, Debug, Default)]
pub struct SyncBatch {
    pub next_cursor: SyncCursor,
    /// Timeline events per joined room, in arrival order.
    pub joined: BTreeMap<RoomId, Vec<Event>>,
    /// Pending invites; the payload is opaque to the core.
    pub invites: BTreeMap<RoomId, serde_json::Value>,
}

impl SyncBatch {
    pub fn timeline_len(&self) -> usize {
        self.joined.values().map(Vec::len).sum()
    }
}

/// Port over the chat server.
///
/// Implementations never retry on their own; retry policy belongs to the
/// sync loop.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn join(&self, room: &RoomId) -> Result<(), TransportError>;

    async fn send(&self, room: &RoomId, body: &str, msg_type: MsgType)
        -> Result<(), TransportError>;

    /// Long-poll for new events.
    ///
    /// With `cursor == None` the implementation must request zero timeline
    /// history; `wait` only applies once a cursor exists.
    async fn poll(
        &self,
        cursor: Option<&SyncCursor>,
        wait: Duration,
    ) -> Result<SyncBatch, TransportError>;
}

/// Convenience for the common "plaintext notice" reply.
pub async fn send_notice(
    transport: &dyn RoomTransport,
    room: &RoomId,
    body: &str,
) -> Result<(), TransportError> {
    transport.send(room, body, MsgType::Notice).await
}
