//! Routes decoded events to the join handler, the command dispatcher or the
//! spam policy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    commands::{parse_command, CommandDispatcher},
    domain::{Event, Identity, MsgType, RoomId},
    policy::SpamPolicy,
    settings::SettingsStore,
    sync::EventSink,
    transport::{send_notice, RoomTransport},
};

pub struct BotHandler {
    /// The account this bot runs as; its own events are never handled.
    me: Identity,
    transport: Arc<dyn RoomTransport>,
    store: Arc<SettingsStore>,
    policy: SpamPolicy,
    commands: CommandDispatcher,
}

impl BotHandler {
    pub fn new(transport: Arc<dyn RoomTransport>, store: Arc<SettingsStore>, me: Identity) -> Self {
        Self {
            me,
            commands: CommandDispatcher::new(store.clone(), transport.clone()),
            policy: SpamPolicy::new(),
            transport,
            store,
        }
    }

    async fn classify(&self, event: &Event) {
        let settings = self.store.get().await;
        let verdict = self.policy.evaluate(event, &settings);
        if !verdict.blocked {
            return;
        }
        let reason = verdict.reason.unwrap_or_default();

        tracing::info!(
            room = %event.room_id,
            sender = %event.sender,
            event_id = %event.id,
            reason = %reason,
            "message flagged"
        );
        let notice = format!("{}: {reason}", event.sender);
        if let Err(e) = send_notice(self.transport.as_ref(), &event.room_id, &notice).await {
            tracing::warn!(room = %event.room_id, error = %e, "failed to send spam notice");
        }
    }
}

#[async_trait]
impl EventSink for BotHandler {
    async fn on_room_event(&self, event: &Event) {
        if event.sender == self.me {
            return;
        }
        let Some(body) = event.message_body() else {
            return;
        };

        // Commands only come as plain text; notices are never commands.
        if event.msg_type == Some(MsgType::Text) {
            if let Some(cmd) = parse_command(body) {
                self.commands.dispatch(&event.room_id, &event.sender, cmd).await;
                return;
            }
        }

        self.classify(event).await;
    }

    async fn on_invite(&self, room: &RoomId) {
        // Every invite is accepted, whoever sent it.
        tracing::info!(room = %room, "joining room on invite");
        if let Err(e) = self.transport.join(room).await {
            tracing::warn!(room = %room, error = %e, "failed to join room");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::EventKind,
        errors::TransportError,
        settings::Settings,
        testing::{text_event, FakeTransport},
    };

    fn handler() -> (BotHandler, Arc<FakeTransport>, Arc<SettingsStore>) {
        let mut s = Settings::with_default_whitelist();
        s.admins.insert(Identity::new("@admin:x"));
        s.bot_user = Some(Identity::new("@bot:x"));
        let store = Arc::new(SettingsStore::in_memory(s));
        let transport = Arc::new(FakeTransport::default());
        let h = BotHandler::new(transport.clone(), store.clone(), Identity::new("@bot:x"));
        (h, transport, store)
    }

    #[tokio::test]
    async fn spam_gets_a_notice_in_the_same_room() {
        let (h, t, _) = handler();
        h.on_room_event(&text_event("!r:x", "@eve:x", "check out evil-domain.biz for a deal"))
            .await;
        let sent = t.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, RoomId::new("!r:x"));
        assert_eq!(
            sent[0].1,
            "@eve:x: Message contains links to prohibited domains: evil-domain.biz"
        );
        assert_eq!(sent[0].2, MsgType::Notice);
    }

    #[tokio::test]
    async fn clean_messages_produce_nothing() {
        let (h, t, _) = handler();
        h.on_room_event(&text_event("!r:x", "@eve:x", "good morning, see github.com/rust-lang"))
            .await;
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn own_notices_are_ignored() {
        let (h, t, _) = handler();
        let mut ev = text_event("!r:x", "@bot:x", "URL whitelist: github.com,evil.biz");
        ev.msg_type = Some(MsgType::Notice);
        h.on_room_event(&ev).await;
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn own_notices_stay_ignored_after_a_peer_merge() {
        let (h, t, store) = handler();
        let mut peer = Settings::with_default_whitelist();
        peer.bot_user = Some(Identity::new("@peer:x"));
        store.merge(peer.export()).await;
        assert!(store.get().await.is_bot(&Identity::new("@bot:x")));

        let mut ev = text_event(
            "!r:x",
            "@bot:x",
            "@eve:x: Message contains links to prohibited domains: evil.biz",
        );
        ev.msg_type = Some(MsgType::Notice);
        h.on_room_event(&ev).await;
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn pinned_identity_is_ignored_even_when_settings_forget_it() {
        let (h, t, store) = handler();
        store
            .update(|s| {
                s.bot_user = None;
                Ok::<_, ()>(())
            })
            .await
            .unwrap();

        let mut ev = text_event("!r:x", "@bot:x", "@eve:x: evil.biz is not allowed");
        ev.msg_type = Some(MsgType::Notice);
        h.on_room_event(&ev).await;
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn commands_go_to_dispatcher() {
        let (h, t, store) = handler();
        h.on_room_event(&text_event("!r:x", "@admin:x", "$url add evil-domain.biz"))
            .await;
        assert_eq!(t.sent_bodies(), vec!["Added evil-domain.biz"]);
        assert!(store.get().await.is_whitelisted("evil-domain.biz"));
    }

    #[tokio::test]
    async fn unauthorized_command_is_not_also_classified() {
        let (h, t, store) = handler();
        h.on_room_event(&text_event("!r:x", "@eve:x", "$url add evil-domain.biz"))
            .await;
        assert_eq!(t.sent_bodies(), vec!["url command only usable by admin or mod"]);
        assert!(!store.get().await.is_whitelisted("evil-domain.biz"));
    }

    #[tokio::test]
    async fn sigil_text_that_is_not_a_command_is_classified() {
        let (h, t, _) = handler();
        h.on_room_event(&text_event("!r:x", "@eve:x", "$50 bonus at free-coins.biz"))
            .await;
        assert_eq!(
            t.sent_bodies(),
            vec!["@eve:x: Message contains links to prohibited domains: free-coins.biz"]
        );
    }

    #[tokio::test]
    async fn non_message_events_are_ignored() {
        let (h, t, _) = handler();
        let mut ev = text_event("!r:x", "@eve:x", "evil.biz");
        ev.kind = EventKind::Other;
        h.on_room_event(&ev).await;
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn invites_are_joined() {
        let (h, t, _) = handler();
        h.on_invite(&RoomId::new("!new:x")).await;
        assert_eq!(t.joined(), vec![RoomId::new("!new:x")]);
    }

    #[tokio::test]
    async fn send_failures_are_swallowed() {
        let (h, t, _) = handler();
        t.fail_sends_with(TransportError::status(403, "forbidden"));
        h.on_room_event(&text_event("!r:x", "@eve:x", "evil.biz")).await;
        assert!(t.sent().is_empty());
    }
}
