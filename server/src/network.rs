//! Server network layer: WebSocket accept loop and the main event loop
//!
//! Connection tasks never touch game state. They forward text frames to the
//! main loop over a channel; the main loop hands each one to the router and
//! queues the router's replies on the recipients' writer tasks.

use crate::client_manager::ClientManager;
use crate::router::{Outbound, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ConnectionId;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main loop
#[derive(Debug)]
pub enum NetworkEvent {
    TextReceived {
        client_id: ConnectionId,
        text: String,
    },
    Disconnected {
        client_id: ConnectionId,
    },
    Shutdown,
}

/// Main server coordinating connections and game state
pub struct Server {
    listener: Arc<TcpListener>,
    clients: Arc<RwLock<ClientManager>>,
    router: Router,

    server_tx: mpsc::UnboundedSender<NetworkEvent>,
    server_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    /// Binds the listener. `seed` fixes the random-attack sequence.
    pub async fn new(
        addr: &str,
        max_clients: usize,
        seed: Option<u64>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = Arc::new(TcpListener::bind(addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            router: Router::new(seed),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Sender that stops `run` when given `NetworkEvent::Shutdown`
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<NetworkEvent> {
        self.server_tx.clone()
    }

    /// Spawns task that accepts sockets and starts one connection task each
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("TCP connection from {}", addr);
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&clients),
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Queues router output in order, one writer queue per recipient
    async fn deliver(&self, outbound: Vec<Outbound>) {
        let clients = self.clients.read().await;
        for Outbound { recipient, message } in outbound {
            match message.encode() {
                Ok(text) => {
                    clients.send_text(recipient, text);
                }
                Err(e) => error!("Failed to encode {} for {}: {}", message.kind(), recipient, e),
            }
        }
    }

    /// Main server loop; processes one event to completion before the next
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();
        info!("Server started successfully");

        while let Some(event) = self.server_rx.recv().await {
            match event {
                NetworkEvent::TextReceived { client_id, text } => {
                    let outbound = self.router.handle_message(client_id, &text);
                    self.deliver(outbound).await;
                }
                NetworkEvent::Disconnected { client_id } => {
                    self.clients.write().await.remove_client(client_id);
                    let outbound = self.router.handle_disconnect(client_id);
                    self.deliver(outbound).await;
                }
                NetworkEvent::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Runs one socket: handshake, registration, writer task, then reads until
/// the peer goes away
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    server_tx: mpsc::UnboundedSender<NetworkEvent>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut stream) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client_id = clients.write().await.add_client(addr, tx);
    let Some(client_id) = client_id else {
        let frame = CloseFrame {
            code: CloseCode::Again,
            reason: Cow::Borrowed("Server full"),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!("Failed to send close frame to {}: {}", addr, e);
        }
        return;
    };

    // Ends when the client manager drops the sender
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("Write to client {} failed: {}", client_id, e);
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!("<- {}: {}", client_id, text);
                if server_tx
                    .send(NetworkEvent::TextReceived { client_id, text })
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => warn!("Ignoring binary frame from {}", client_id),
            Ok(_) => {}
            Err(e) => {
                debug!("Read from client {} failed: {}", client_id, e);
                break;
            }
        }
    }

    if server_tx
        .send(NetworkEvent::Disconnected { client_id })
        .is_err()
    {
        debug!("Main loop gone before client {} disconnect", client_id);
    }
}
