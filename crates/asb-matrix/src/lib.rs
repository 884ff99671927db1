//! Matrix client-server adapter.
//!
//! Implements the `asb-core` `RoomTransport` port over plain HTTP calls.
//! Nothing here retries: errors go back to the caller typed.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{RequestBuilder, Url};

use asb_core::{
    domain::{Identity, MsgType, RoomId, SyncCursor},
    errors::{Error, TransportError},
    transport::{RoomTransport, SyncBatch},
    Result,
};

mod wire;

const API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];

pub struct MatrixClient {
    base: Url,
    access_token: String,
    http: reqwest::Client,
    request_timeout: Duration,
    txn_counter: AtomicU64,
}

impl MatrixClient {
    pub fn new(
        homeserver: &str,
        access_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(homeserver)
            .map_err(|e| Error::Config(format!("invalid homeserver url {homeserver:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("homeserver url {homeserver:?} cannot be a base")));
        }

        // No client-wide timeout: long-polls set their own per request.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;

        Ok(Self {
            base,
            access_token: access_token.into(),
            http,
            request_timeout,
            txn_counter: AtomicU64::new(0),
        })
    }

    /// Identity the access token belongs to.
    pub async fn whoami(&self) -> std::result::Result<Identity, TransportError> {
        let url = self.endpoint(&["account", "whoami"])?;
        let body = self.execute(self.http.get(url), self.request_timeout).await?;
        wire::decode_whoami(&body)
    }

    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    /// Client-generated transaction id: millis plus a per-process counter.
    fn next_txn_id(&self) -> String {
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}.{n}", Utc::now().timestamp_millis())
    }

    async fn execute(
        &self,
        req: RequestBuilder,
        timeout: Duration,
    ) -> std::result::Result<String, TransportError> {
        let resp = req
            .bearer_auth(&self.access_token)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::status(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl RoomTransport for MatrixClient {
    async fn join(&self, room: &RoomId) -> std::result::Result<(), TransportError> {
        let url = self.endpoint(&["join", room.as_str()])?;
        self.execute(
            self.http.post(url).json(&serde_json::json!({})),
            self.request_timeout,
        )
        .await?;
        Ok(())
    }

    async fn send(
        &self,
        room: &RoomId,
        body: &str,
        msg_type: MsgType,
    ) -> std::result::Result<(), TransportError> {
        let txn = self.next_txn_id();
        let url = self.endpoint(&["rooms", room.as_str(), "send", "m.room.message", &txn])?;
        let content = serde_json::json!({
            "msgtype": wire::msgtype_str(msg_type),
            "body": body,
        });
        self.execute(self.http.put(url).json(&content), self.request_timeout)
            .await?;
        Ok(())
    }

    async fn poll(
        &self,
        cursor: Option<&SyncCursor>,
        wait: Duration,
    ) -> std::result::Result<SyncBatch, TransportError> {
        let url = self.endpoint(&["sync"])?;
        let req = self.http.get(url).query(&wire::sync_query(cursor, wait));
        // The server may hold the request for the whole wait.
        let body = self.execute(req, wait + self.request_timeout).await?;
        wire::decode_sync(&body)
    }
}
