//! Connected sockets and their outbound queues
//!
//! Every accepted WebSocket gets a `ConnectionId` and an unbounded FIFO queue
//! drained by its writer task. Pushing all messages for one socket through a
//! single queue keeps them in the order the router produced them.

use log::{debug, info, warn};
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// One open WebSocket connection
#[derive(Debug)]
pub struct Client {
    pub id: ConnectionId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    sender: mpsc::UnboundedSender<Message>,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, addr, sender }
    }

    /// Queues a frame for the writer task. Fails once the writer is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Roster of open connections with a capacity limit
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    /// Ids are never reused within a process
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Client ids start from 1
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns `None` when the server is at capacity
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            warn!("Refusing {}: server full ({} clients)", addr, self.max_clients);
            return None;
        }

        let client_id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} ({}) disconnected", client.id, client.addr);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, client_id: ConnectionId) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Queues a text frame for one client. Unknown or closed clients are
    /// skipped; their disconnect is handled by the reader side.
    pub fn send_text(&self, client_id: ConnectionId, text: String) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => {
                debug!("-> {}: {}", client_id, text);
                client.send(Message::Text(text))
            }
            None => {
                debug!("Dropping message for unknown client {}", client_id);
                false
            }
        }
    }

    pub fn client_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:3000".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:3001".parse().unwrap()
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);
        let (tx, _rx) = mpsc::unbounded_channel();

        let client_id1 = manager.add_client(test_addr(), tx.clone()).unwrap();
        let client_id2 = manager.add_client(test_addr2(), tx).unwrap();

        assert_eq!(client_id1, ConnectionId(1));
        assert_eq!(client_id2, ConnectionId(2));
        assert_eq!(manager.client_ids(), vec![client_id1, client_id2]);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(manager.add_client(test_addr(), tx.clone()).is_some());
        assert!(manager.add_client(test_addr2(), tx).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut manager = ClientManager::new(1);
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = manager.add_client(test_addr(), tx.clone()).unwrap();
        assert!(manager.remove_client(first));
        assert!(!manager.remove_client(first));

        let second = manager.add_client(test_addr(), tx).unwrap();
        assert_ne!(first, second);
        assert!(manager.contains(second));
        assert!(!manager.contains(first));
    }

    #[test]
    fn test_send_text_preserves_order() {
        let mut manager = ClientManager::new(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = manager.add_client(test_addr(), tx).unwrap();

        assert!(manager.send_text(id, "one".to_string()));
        assert!(manager.send_text(id, "two".to_string()));
        assert!(!manager.send_text(ConnectionId(99), "lost".to_string()));

        assert_eq!(rx.try_recv().unwrap(), Message::Text("one".to_string()));
        assert_eq!(rx.try_recv().unwrap(), Message::Text("two".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_to_closed_writer() {
        let mut manager = ClientManager::new(2);
        let (tx, rx) = mpsc::unbounded_channel();
        let id = manager.add_client(test_addr(), tx).unwrap();
        drop(rx);
        assert!(!manager.send_text(id, "gone".to_string()));
    }
}
