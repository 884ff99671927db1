//! Fakes of the ports, shared by the unit tests of this crate.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Event, EventId, EventKind, Identity, MsgType, RoomId, SyncCursor},
    errors::{Error, TransportError},
    settings::{Settings, SettingsBackend},
    sync::EventSink,
    transport::{RoomTransport, SyncBatch},
};

pub fn text_event(room: &str, sender: &str, body: &str) -> Event {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    Event {
        id: EventId::new(format!("$ev{}", NEXT.fetch_add(1, Ordering::SeqCst))),
        sender: Identity::new(sender),
        room_id: RoomId::new(room),
        kind: EventKind::Message,
        body: Some(body.to_string()),
        msg_type: Some(MsgType::Text),
    }
}

pub fn batch(cursor: &str, events: Vec<Event>) -> SyncBatch {
    let mut b = SyncBatch {
        next_cursor: SyncCursor::new(cursor),
        ..SyncBatch::default()
    };
    for ev in events {
        b.joined.entry(ev.room_id.clone()).or_default().push(ev);
    }
    b
}

#[derive(Default)]
pub struct FakeTransport {
    polls: Mutex<VecDeque<Result<SyncBatch, TransportError>>>,
    polled: Mutex<Vec<Option<SyncCursor>>>,
    sent: Mutex<Vec<(RoomId, String, MsgType)>>,
    joined: Mutex<Vec<RoomId>>,
    fail_sends: Mutex<Option<TransportError>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeTransport {
    /// Fire `cancel` once `n` polls have been made.
    pub fn cancel_after_polls(mut self, n: usize, cancel: CancellationToken) -> Self {
        self.cancel_after = Some((n, cancel));
        self
    }

    pub fn push_poll(&self, r: Result<SyncBatch, TransportError>) {
        self.polls.lock().unwrap().push_back(r);
    }

    pub fn fail_sends_with(&self, e: TransportError) {
        *self.fail_sends.lock().unwrap() = Some(e);
    }

    pub fn polled_cursors(&self) -> Vec<Option<SyncCursor>> {
        self.polled.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(RoomId, String, MsgType)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, body, _)| body).collect()
    }

    pub fn joined(&self) -> Vec<RoomId> {
        self.joined.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoomTransport for FakeTransport {
    async fn join(&self, room: &RoomId) -> Result<(), TransportError> {
        self.joined.lock().unwrap().push(room.clone());
        Ok(())
    }

    async fn send(&self, room: &RoomId, body: &str, msg_type: MsgType) -> Result<(), TransportError> {
        if let Some(e) = self.fail_sends.lock().unwrap().clone() {
            return Err(e);
        }
        self.sent
            .lock()
            .unwrap()
            .push((room.clone(), body.to_string(), msg_type));
        Ok(())
    }

    async fn poll(
        &self,
        cursor: Option<&SyncCursor>,
        _wait: Duration,
    ) -> Result<SyncBatch, TransportError> {
        let count = {
            let mut polled = self.polled.lock().unwrap();
            polled.push(cursor.cloned());
            polled.len()
        };
        if let Some((n, cancel)) = &self.cancel_after {
            if count >= *n {
                cancel.cancel();
            }
        }
        tokio::task::yield_now().await;
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    invites: Mutex<Vec<RoomId>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn invites(&self) -> Vec<RoomId> {
        self.invites.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn on_room_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    async fn on_invite(&self, room: &RoomId) {
        self.invites.lock().unwrap().push(room.clone());
    }
}

/// Settings backend that keeps the last saved document in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<Settings>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryBackend {
    pub fn saved(&self) -> Option<Settings> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail, like a read-only disk.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl SettingsBackend for MemoryBackend {
    fn load(&self) -> crate::Result<Option<Settings>> {
        Ok(self.saved())
    }

    fn save(&self, settings: &Settings) -> crate::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence {
                path: PathBuf::from("<memory>"),
                reason: "saves disabled".to_string(),
            });
        }
        *self.saved.lock().unwrap() = Some(settings.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
