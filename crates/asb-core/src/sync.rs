//! Resumable long-poll loop.
//!
//! `ColdStart -> Polling -> BackingOff -> Polling ...`, forever. The cursor is
//! only replaced by a successful response and never rewinds.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Event, RoomId, SyncCursor},
    errors::TransportError,
    transport::{RoomTransport, SyncBatch},
};

/// Receiver of decoded events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_room_event(&self, event: &Event);
    async fn on_invite(&self, room: &RoomId);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    ColdStart,
    Polling(SyncCursor),
    BackingOff {
        resume: Option<SyncCursor>,
        reason: TransportError,
    },
}

#[derive(Debug)]
pub enum PollResult {
    Ok(SyncBatch),
    TransientFailure(TransportError),
}

impl From<Result<SyncBatch, TransportError>> for PollResult {
    fn from(r: Result<SyncBatch, TransportError>) -> Self {
        match r {
            Ok(batch) => PollResult::Ok(batch),
            Err(e) => PollResult::TransientFailure(e),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Long-poll wait passed to the transport.
    pub wait: Duration,
    /// Fixed delay after a failed poll.
    pub backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(30),
            backoff: Duration::from_secs(5),
        }
    }
}

pub struct SyncLoop {
    transport: Arc<dyn RoomTransport>,
    sink: Arc<dyn EventSink>,
    cfg: SyncConfig,
    state: SyncState,
    consecutive_failures: u32,
}

impl SyncLoop {
    pub fn new(transport: Arc<dyn RoomTransport>, sink: Arc<dyn EventSink>, cfg: SyncConfig) -> Self {
        Self {
            transport,
            sink,
            cfg,
            state: SyncState::ColdStart,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Last cursor handed out by the server, if any.
    pub fn cursor(&self) -> Option<&SyncCursor> {
        match &self.state {
            SyncState::ColdStart => None,
            SyncState::Polling(c) => Some(c),
            SyncState::BackingOff { resume, .. } => resume.as_ref(),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run until `cancel` fires. Checked between iterations only.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("sync loop started");
        while !cancel.is_cancelled() {
            self.step().await;
        }
        tracing::info!("sync loop stopped");
    }

    /// Perform exactly one state transition.
    pub async fn step(&mut self) {
        if let SyncState::BackingOff { resume, .. } = &self.state {
            let resume = resume.clone();
            sleep(self.cfg.backoff).await;
            self.state = match resume {
                Some(c) => SyncState::Polling(c),
                None => SyncState::ColdStart,
            };
            return;
        }

        let cursor = self.cursor().cloned();
        if cursor.is_none() {
            tracing::info!("initial sync");
        }

        let result = PollResult::from(self.transport.poll(cursor.as_ref(), self.cfg.wait).await);
        match result {
            PollResult::Ok(batch) => {
                if self.consecutive_failures > 0 {
                    tracing::info!(failures = self.consecutive_failures, "sync recovered");
                }
                self.consecutive_failures = 0;
                self.state = SyncState::Polling(batch.next_cursor.clone());
                self.dispatch(batch, cursor.is_none()).await;
            }
            PollResult::TransientFailure(reason) => {
                self.consecutive_failures += 1;
                tracing::warn!(
                    error = %reason,
                    failures = self.consecutive_failures,
                    backoff_ms = self.cfg.backoff.as_millis() as u64,
                    "sync failed, backing off"
                );
                self.state = SyncState::BackingOff {
                    resume: cursor,
                    reason,
                };
            }
        }
    }

    async fn dispatch(&self, batch: SyncBatch, cold_start: bool) {
        let SyncBatch { joined, invites, .. } = batch;

        // The initial sync only establishes a cursor; history is never replayed.
        if cold_start {
            let skipped: usize = joined.values().map(Vec::len).sum();
            if skipped > 0 {
                tracing::debug!(skipped, "discarding backlog from initial sync");
            }
        } else {
            for events in joined.values() {
                for event in events {
                    self.sink.on_room_event(event).await;
                }
            }
        }

        for room in invites.keys() {
            self.sink.on_invite(room).await;
        }
    }
}
