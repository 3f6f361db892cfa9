use crate::PartyEvent;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;

/// One live subscriber connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub tx: UnboundedSender<String>,
    /// Where the connection originated (e.g. "lobby"); drives presence
    /// handling on connect/disconnect.
    pub context: Option<String>,
}

/// Registry of live connections per session. Sends are best-effort: a dead
/// receiver just drops its messages until the disconnect lands.
#[derive(Default)]
pub struct Broadcaster {
    sessions: RwLock<HashMap<uuid::Uuid, HashMap<uuid::Uuid, Connection>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(
        &self,
        session: uuid::Uuid,
        player: uuid::Uuid,
        tx: UnboundedSender<String>,
        context: Option<String>,
    ) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session)
            .or_default()
            .insert(player, Connection { tx, context });
        log::info!(
            "[realtime] {} connected to {} ({} online)",
            player,
            session,
            sessions.get(&session).map_or(0, |c| c.len())
        );
    }

    /// Remove the connection, returning it so callers can read its context.
    pub async fn disconnect(&self, session: uuid::Uuid, player: uuid::Uuid) -> Option<Connection> {
        let mut sessions = self.sessions.write().await;
        let connections = sessions.get_mut(&session)?;
        let removed = connections.remove(&player);
        if connections.is_empty() {
            sessions.remove(&session);
            log::debug!("[realtime] session {} has no subscribers", session);
        }
        removed
    }

    pub async fn broadcast(
        &self,
        session: uuid::Uuid,
        event: &PartyEvent,
        exclude: Option<uuid::Uuid>,
    ) {
        let payload = event.to_json();
        let sessions = self.sessions.read().await;
        let Some(connections) = sessions.get(&session) else {
            return;
        };
        for (player, connection) in connections {
            if Some(*player) == exclude {
                continue;
            }
            let _ = connection.tx.send(payload.clone());
        }
    }

    pub async fn send(&self, session: uuid::Uuid, player: uuid::Uuid, event: &PartyEvent) {
        let sessions = self.sessions.read().await;
        if let Some(connection) = sessions.get(&session).and_then(|c| c.get(&player)) {
            let _ = connection.tx.send(event.to_json());
        }
    }

    pub async fn connection_count(&self, session: uuid::Uuid) -> usize {
        self.sessions
            .read()
            .await
            .get(&session)
            .map_or(0, |c| c.len())
    }

    pub async fn connection_context(
        &self,
        session: uuid::Uuid,
        player: uuid::Uuid,
    ) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(&session)
            .and_then(|c| c.get(&player))
            .and_then(|c| c.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn broadcast_reaches_all_but_excluded() {
        let broadcaster = Broadcaster::new();
        let session = uuid::Uuid::now_v7();
        let (alice, bob) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        broadcaster.connect(session, alice, tx_a, None).await;
        broadcaster.connect(session, bob, tx_b, None).await;

        broadcaster
            .broadcast(
                session,
                &PartyEvent::SessionStarted {
                    session_id: session,
                },
                Some(bob),
            )
            .await;
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_returns_context_and_prunes() {
        let broadcaster = Broadcaster::new();
        let session = uuid::Uuid::now_v7();
        let player = uuid::Uuid::now_v7();
        let (tx, _rx) = unbounded_channel();
        broadcaster
            .connect(session, player, tx, Some("lobby".into()))
            .await;
        let removed = broadcaster.disconnect(session, player).await.unwrap();
        assert_eq!(removed.context.as_deref(), Some("lobby"));
        assert_eq!(broadcaster.connection_count(session).await, 0);
    }

    #[tokio::test]
    async fn send_targets_one_player() {
        let broadcaster = Broadcaster::new();
        let session = uuid::Uuid::now_v7();
        let (alice, bob) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        broadcaster.connect(session, alice, tx_a, None).await;
        broadcaster.connect(session, bob, tx_b, None).await;
        broadcaster
            .send(
                session,
                bob,
                &PartyEvent::HostPing {
                    session_id: session,
                    message: "hurry up".into(),
                },
            )
            .await;
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }
}
