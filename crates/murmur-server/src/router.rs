//! Message Router.
//!
//! Validates and stamps an outgoing message, fans it out to the live
//! audience of its chat, then hands it to the store in the background.
//! Live delivery never waits on persistence.

use chrono::{DateTime, Utc};
use murmur_shared::message::validate_body;
use murmur_shared::{Chat, ChatError, ConnectionId, Message, ServerEvent};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::hub::{Hub, HubState};

/// Outcome of a [`Hub::send_message`].
#[derive(Debug)]
pub struct Delivery {
    pub message: Message,
    /// Connections the message was queued on.
    pub recipients: Vec<ConnectionId>,
    /// Resolves to `true` once the message is stored.
    pub persisted: JoinHandle<bool>,
}

impl HubState {
    /// Live connections that see traffic in `chat`: the peer's connection
    /// for a direct chat, the room members for a group.
    pub(crate) fn chat_audience(&self, chat: &Chat) -> Vec<ConnectionId> {
        match chat {
            Chat::Direct { peer } => self.presence.lookup(peer).into_iter().collect(),
            Chat::Group { .. } => self.rooms.members(chat),
        }
    }
}

impl Hub {
    /// Deliver a message from an identified connection.
    ///
    /// The sender always receives its own message exactly once, even when
    /// it is not in the group's room or is messaging itself.
    pub async fn send_message(
        &self,
        conn: ConnectionId,
        chat: Chat,
        body: &str,
        client_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Delivery, ChatError> {
        let (message, recipients) = {
            let state = self.state.lock().await;
            let sender = state.sender_name(conn)?;
            let body = validate_body(body, self.settings.max_message_len)?;
            let message = Message::new(sender, &chat, body, client_timestamp);

            let mut recipients = state.chat_audience(&chat);
            if !recipients.contains(&conn) {
                recipients.push(conn);
            }

            let event = ServerEvent::MessageDelivered(message.clone());
            let delivered = state.emit_many(recipients.iter().copied(), &event);
            debug!(
                id = %message.id,
                chat = %chat,
                recipients = recipients.len(),
                delivered,
                "Message routed"
            );
            (message, recipients)
        };

        let persisted = self.persist_in_background(conn, message.clone());

        Ok(Delivery {
            message,
            recipients,
            persisted,
        })
    }

    /// Store the message without blocking delivery. A failure is reported
    /// to the sender only and never retried.
    fn persist_in_background(&self, sender: ConnectionId, message: Message) -> JoinHandle<bool> {
        let hub = self.clone();
        tokio::spawn(async move {
            let id = message.id;
            match hub.store.append(message).await {
                Ok(()) => {
                    debug!(id = %id, "Message persisted");
                    true
                }
                Err(e) => {
                    warn!(
                        id = %id,
                        sender = %sender,
                        error = %e,
                        "Failed to persist delivered message"
                    );
                    hub.notify(sender, ServerEvent::persist_failed(id, e.to_string()))
                        .await;
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use murmur_shared::constants::PERSIST_FAILED_CODE;
    use murmur_store::MessageFilter;

    use super::*;
    use crate::hub::HubSettings;
    use crate::store::MessageStore;
    use crate::test_support::{
        delivered, drain, hub_with_store, memory_hub, memory_hub_and_store, online, FailingStore,
    };

    #[tokio::test]
    async fn test_direct_message_reaches_both_once() {
        let (hub, store) = memory_hub_and_store();
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        let (_bob, mut bob_rx) = online(&hub, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let delivery = hub
            .send_message(alice, Chat::direct("bob"), "hi", None)
            .await
            .unwrap();
        assert!(delivery.persisted.await.unwrap());

        let to_alice = delivered(&drain(&mut alice_rx));
        let to_bob = delivered(&drain(&mut bob_rx));
        assert_eq!(to_alice.len(), 1);
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_bob[0].sender, "alice");
        assert_eq!(to_bob[0].recipient.as_deref(), Some("bob"));
        assert_eq!(to_bob[0].body, "hi");
        assert_eq!(to_alice[0], to_bob[0]);

        let stored = store
            .query(
                MessageFilter::DirectThread {
                    a: "alice".into(),
                    b: "bob".into(),
                },
                50,
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, delivery.message.id);
    }

    #[tokio::test]
    async fn test_direct_message_to_offline_peer() {
        let (hub, store) = memory_hub_and_store();
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        drain(&mut alice_rx);

        let delivery = hub
            .send_message(alice, Chat::direct("carol"), "are you there", None)
            .await
            .unwrap();
        assert_eq!(delivery.recipients, vec![alice]);
        assert!(delivery.persisted.await.unwrap());

        assert_eq!(delivered(&drain(&mut alice_rx)).len(), 1);
        let stored = store
            .query(MessageFilter::SentBy(vec!["alice".into()]), 50)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_message_to_self_delivered_once() {
        let hub = memory_hub();
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        drain(&mut alice_rx);

        hub.send_message(alice, Chat::direct("alice"), "note", None)
            .await
            .unwrap();
        assert_eq!(delivered(&drain(&mut alice_rx)).len(), 1);
    }

    #[tokio::test]
    async fn test_group_message_reaches_room_members() {
        let hub = memory_hub();
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        let (bob, mut bob_rx) = online(&hub, "bob").await;
        let (carol, mut carol_rx) = online(&hub, "carol").await;
        let (_dave, mut dave_rx) = online(&hub, "dave").await;

        let group = Chat::group(7);
        for conn in [alice, bob, carol] {
            hub.join_chat(conn, group.clone()).await.unwrap();
        }
        for rx in [&mut alice_rx, &mut bob_rx, &mut carol_rx, &mut dave_rx] {
            drain(rx);
        }

        hub.send_message(alice, group.clone(), "standup", None)
            .await
            .unwrap();

        for rx in [&mut alice_rx, &mut bob_rx, &mut carol_rx] {
            let msgs = delivered(&drain(rx));
            assert_eq!(msgs.len(), 1);
            assert_eq!(msgs[0].chat_id, "7");
            assert!(msgs[0].recipient.is_none());
        }
        assert!(drain(&mut dave_rx).is_empty());
    }

    #[tokio::test]
    async fn test_group_sender_outside_room_gets_echo() {
        let hub = memory_hub();
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        let (bob, mut bob_rx) = online(&hub, "bob").await;
        hub.join_chat(bob, Chat::group(3)).await.unwrap();
        hub.join_chat(alice, Chat::direct("bob")).await.unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        hub.send_message(alice, Chat::group(3), "drive-by", None)
            .await
            .unwrap();

        assert_eq!(delivered(&drain(&mut alice_rx)).len(), 1);
        assert_eq!(delivered(&drain(&mut bob_rx)).len(), 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let hub = memory_hub();
        let (anon, _anon_rx) = hub.connect().await;
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        drain(&mut alice_rx);

        let err = hub
            .send_message(anon, Chat::direct("alice"), "hi", None)
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::Unauthenticated);

        let err = hub
            .send_message(anon, Chat::direct("alice"), "  ", None)
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::Unauthenticated);

        let err = hub
            .send_message(alice, Chat::direct("bob"), "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::EmptyBody);

        let long = "x".repeat(HubSettings::default().max_message_len + 1);
        let err = hub
            .send_message(alice, Chat::direct("bob"), &long, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MessageTooLarge { .. }));

        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_warns_sender_only() {
        let hub = hub_with_store(Arc::new(FailingStore), HubSettings::default());
        let (alice, mut alice_rx) = online(&hub, "alice").await;
        let (_bob, mut bob_rx) = online(&hub, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let delivery = hub
            .send_message(alice, Chat::direct("bob"), "hi", None)
            .await
            .unwrap();
        assert!(!delivery.persisted.await.unwrap());

        let alice_events = drain(&mut alice_rx);
        assert_eq!(delivered(&alice_events).len(), 1);
        assert!(alice_events.iter().any(|e| matches!(
            e,
            ServerEvent::PersistWarning { message_id, code, .. }
                if *message_id == delivery.message.id && code == PERSIST_FAILED_CODE
        )));

        let bob_events = drain(&mut bob_rx);
        assert_eq!(delivered(&bob_events).len(), 1);
        assert!(!bob_events
            .iter()
            .any(|e| matches!(e, ServerEvent::PersistWarning { .. })));
    }

    #[tokio::test]
    async fn test_client_timestamp_is_advisory() {
        let hub = memory_hub();
        let (alice, _rx) = online(&hub, "alice").await;
        let claimed = DateTime::parse_from_rfc3339("2001-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let delivery = hub
            .send_message(alice, Chat::direct("bob"), "hi", Some(claimed))
            .await
            .unwrap();
        assert_eq!(delivery.message.client_timestamp, Some(claimed));
        assert!(delivery.message.timestamp > claimed);
    }
}
