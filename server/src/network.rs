//! Server network layer handling WebSocket connections and the registry event loop

use crate::registry::SessionRegistry;
use crate::transport::{ConnectionId, Transport, TransportError};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn: ConnectionId,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<Message>,
    },
    PayloadReceived {
        conn: ConnectionId,
        payload: Vec<u8>,
    },
    Disconnected {
        conn: ConnectionId,
    },
    Shutdown,
}

/// Outbound queues for every open WebSocket
///
/// Each connection has an unbounded queue drained by its own writer task,
/// so sending never waits on the network. Connections closed by the server
/// stay in `closing` until their reader task reports the disconnect, and
/// their inbound frames are dropped meanwhile.
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    outboxes: HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    closing: HashSet<ConnectionId>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, conn: ConnectionId, outbox: mpsc::UnboundedSender<Message>) {
        self.outboxes.insert(conn, outbox);
    }

    /// Drops the outbox for `conn`, which ends its writer task
    pub fn detach(&mut self, conn: ConnectionId) {
        self.outboxes.remove(&conn);
        self.closing.remove(&conn);
    }

    /// Whether the server already dropped `conn` and is waiting for its socket to end
    pub fn is_closing(&self, conn: ConnectionId) -> bool {
        self.closing.contains(&conn)
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }
}

impl Transport for WebSocketTransport {
    fn send(&mut self, conn: ConnectionId, payload: &str) -> Result<(), TransportError> {
        let outbox = self
            .outboxes
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        outbox
            .send(Message::Text(payload.to_string().into()))
            .map_err(|_| TransportError::QueueClosed(conn))
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        self.closing.insert(conn);
        if let Some(outbox) = self.outboxes.remove(&conn) {
            if outbox.send(Message::Close(None)).is_err() {
                debug!("{}: writer already gone", conn);
            }
        }
    }
}

/// WebSocket server feeding a single [`SessionRegistry`]
pub struct Server {
    listener: TcpListener,
    registry: SessionRegistry<WebSocketTransport>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        registry: SessionRegistry<WebSocketTransport>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            registry,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for injecting events, e.g. [`ServerEvent::Shutdown`]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.server_tx.clone()
    }

    /// Spawns task that accepts TCP connections and hands each to its own task
    fn spawn_acceptor(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerEvent>) {
        tokio::spawn(async move {
            let mut next_id = 0u64;

            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    _ = server_tx.closed() => break,
                };

                match accepted {
                    Ok((stream, addr)) => {
                        next_id += 1;
                        let conn = ConnectionId(next_id);
                        tokio::spawn(handle_connection(stream, addr, conn, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }

            debug!("Acceptor stopped");
        });
    }

    /// Main server loop applying connection events to the registry one at a time
    pub async fn run(self) -> io::Result<()> {
        let Server {
            listener,
            mut registry,
            server_tx,
            mut server_rx,
        } = self;

        Self::spawn_acceptor(listener, server_tx);
        info!("Server started successfully");

        while let Some(event) = server_rx.recv().await {
            match event {
                ServerEvent::Connected { conn, addr, outbox } => {
                    info!("{} connected from {}", conn, addr);
                    registry.transport_mut().attach(conn, outbox);
                }
                ServerEvent::PayloadReceived { conn, payload } => {
                    if registry.transport().is_closing(conn) {
                        debug!("{}: dropping frame from closed connection", conn);
                        continue;
                    }
                    registry.handle_payload(conn, &payload, Instant::now());
                }
                ServerEvent::Disconnected { conn } => {
                    info!("{} disconnected", conn);
                    registry.unregister(conn);
                    registry.transport_mut().detach(conn);
                }
                ServerEvent::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Performs the WebSocket handshake, then pumps frames in both directions
/// until either side closes
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnectionId,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<Message>();

    if server_tx
        .send(ServerEvent::Connected { conn, addr, outbox })
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = write.send(message).await {
                debug!("{}: send failed: {}", conn, e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(frame) = read.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("{}: read failed: {}", conn, e);
                break;
            }
        };

        if server_tx
            .send(ServerEvent::PayloadReceived { conn, payload })
            .is_err()
        {
            return;
        }
    }

    if let Err(e) = server_tx.send(ServerEvent::Disconnected { conn }) {
        error!("Failed to report disconnect of {}: {}", conn, e);
    }
}
