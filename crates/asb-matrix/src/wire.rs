//! `/sync` wire format and its decoding into core events.

use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;

use asb_core::{
    domain::{Event, EventId, EventKind, Identity, MsgType, RoomId, SyncCursor},
    errors::TransportError,
    transport::SyncBatch,
};

/// Zero timeline entries: an initial sync only establishes the cursor.
pub(crate) const INITIAL_SYNC_FILTER: &str = r#"{"room":{"timeline":{"limit":0}}}"#;

pub(crate) fn sync_query(cursor: Option<&SyncCursor>, wait: Duration) -> Vec<(&'static str, String)> {
    match cursor {
        Some(c) => vec![
            ("since", c.as_str().to_string()),
            ("timeout", wait.as_millis().to_string()),
        ],
        None => vec![("filter", INITIAL_SYNC_FILTER.to_string())],
    }
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
struct Rooms {
    #[serde(default)]
    join: BTreeMap<String, JoinedRoom>,
    #[serde(default)]
    invite: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    // Kept raw so one odd event cannot poison the whole batch.
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: String,
    sender: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    user_id: String,
}

pub(crate) fn decode_whoami(body: &str) -> Result<Identity, TransportError> {
    let w: WhoAmI = serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(Identity::new(w.user_id))
}

pub(crate) fn decode_sync(body: &str) -> Result<SyncBatch, TransportError> {
    let resp: SyncResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    if resp.next_batch.is_empty() {
        return Err(TransportError::Decode("empty next_batch".to_string()));
    }

    let mut joined = BTreeMap::new();
    for (room, data) in resp.rooms.join {
        let room = RoomId::new(room);
        let events: Vec<Event> = data
            .timeline
            .events
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<RawEvent>(raw) {
                Ok(ev) => Some(decode_event(&room, ev)),
                Err(e) => {
                    tracing::warn!(room = %room, error = %e, "skipping undecodable event");
                    None
                }
            })
            .collect();
        joined.insert(room, events);
    }

    let invites = resp
        .rooms
        .invite
        .into_iter()
        .map(|(room, data)| (RoomId::new(room), data))
        .collect();

    Ok(SyncBatch {
        next_cursor: SyncCursor::new(resp.next_batch),
        joined,
        invites,
    })
}

fn decode_event(room: &RoomId, raw: RawEvent) -> Event {
    let content_str = |key: &str| raw.content.get(key).and_then(|v| v.as_str());

    let kind = match raw.event_type.as_str() {
        "m.room.message" => EventKind::Message,
        "m.room.member" if content_str("membership") == Some("invite") => EventKind::Invite,
        _ => EventKind::Other,
    };

    let (body, msg_type) = match kind {
        EventKind::Message => (
            content_str("body").map(str::to_string),
            match content_str("msgtype") {
                Some("m.text") => Some(MsgType::Text),
                Some("m.notice") => Some(MsgType::Notice),
                _ => None,
            },
        ),
        _ => (None, None),
    };

    Event {
        id: EventId::new(raw.event_id),
        sender: Identity::new(raw.sender),
        room_id: room.clone(),
        kind,
        body,
        msg_type,
    }
}

pub(crate) fn msgtype_str(msg_type: MsgType) -> &'static str {
    match msg_type {
        MsgType::Text => "m.text",
        MsgType::Notice => "m.notice",
    }
}
