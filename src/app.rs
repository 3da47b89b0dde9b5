//! Main application lifecycle and coordination.
//!
//! The [`App`] wires the connection manager, message queues, heartbeat
//! monitor, reconnection policy, discovery, and history together. Network
//! components report through one event channel; the app owns the receiving
//! end and is the only place where those events turn into decisions:
//! enqueueing received chat, tearing down timed-out peers, and starting
//! reconnection rounds.

use crate::history::MessageHistory;
use crate::network::{
    ConnectionManager, HeartbeatMonitor, NetworkEvent, PeerDiscovery, ReconnectionPolicy,
};
use crate::transport::{Message, MessageQueue};
use crate::utils::{MessengerConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Top-level application coordinating all messenger components
pub struct App {
    config: MessengerConfig,
    local_id: String,
    queue: Arc<MessageQueue>,
    manager: Arc<ConnectionManager>,
    heartbeat: Arc<HeartbeatMonitor>,
    reconnect: Arc<ReconnectionPolicy>,
    discovery: Option<Arc<PeerDiscovery>>,
    history: Option<Arc<MessageHistory>>,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
    shutdown: watch::Sender<bool>,
    /// Last known endpoint per peer id, for reconnection
    endpoints: HashMap<String, (String, u16)>,
}

impl App {
    /// Create a new application instance from configuration
    pub fn new(config: MessengerConfig) -> Result<Self> {
        config.validate()?;
        config.ensure_directories()?;

        let local_id = Uuid::new_v4().to_string()[..8].to_string();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let heartbeat = Arc::new(HeartbeatMonitor::new(
            Duration::from_secs(config.resilience.heartbeat_timeout),
            event_tx.clone(),
        ));
        let manager = Arc::new(ConnectionManager::new(
            local_id.clone(),
            config.clone(),
            event_tx.clone(),
            Arc::clone(&heartbeat),
            shutdown_rx,
        ));
        let reconnect = Arc::new(ReconnectionPolicy::new(
            config.resilience.max_reconnect_attempts,
            Duration::from_millis(config.resilience.reconnect_initial_delay_ms),
            Duration::from_millis(config.resilience.reconnect_max_delay_ms),
            event_tx.clone(),
        ));
        let discovery = config.network.enable_discovery.then(|| {
            Arc::new(PeerDiscovery::new(
                local_id.clone(),
                config.network.listen_port,
                config.network.discovery_port,
                Duration::from_secs(config.network.discovery_interval),
                event_tx.clone(),
            ))
        });
        let history = config
            .storage
            .enable_history
            .then(|| Arc::new(MessageHistory::open(&config.storage.history_file)));

        Ok(Self {
            config,
            local_id,
            queue: Arc::new(MessageQueue::new()),
            manager,
            heartbeat,
            reconnect,
            discovery,
            history,
            events: event_rx,
            shutdown: shutdown_tx,
            endpoints: HashMap::new(),
        })
    }

    /// This node's peer id
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The message queues decoupling the network from the application
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// The connection manager, for direct connect/disconnect calls
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Queue a chat message for delivery to all connected peers
    pub fn send_message(&self, content: impl Into<String>) {
        let message = Message::new_chat(&self.config.network.display_name, content);
        if let Some(history) = &self.history {
            history.append(&message);
        }
        self.queue.enqueue_outgoing(message);
    }

    /// Run the application until shutdown.
    ///
    /// Starts the listener, discovery, heartbeat cycles, and the queue pumps,
    /// then processes network events. In interactive mode a console command
    /// loop runs alongside and can request shutdown.
    pub async fn run(mut self, interactive: bool) -> Result<()> {
        log::info!("starting secure messenger");
        log::info!("peer id: {}", self.local_id);

        match self.manager.listen(self.config.network.listen_port).await {
            Ok(port) => log::info!("accepting connections on port {port}"),
            Err(e) => log::warn!("listener unavailable, outbound only: {e}"),
        }

        self.spawn_background_tasks();
        if interactive {
            self.spawn_command_loop();
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.finish();
        Ok(())
    }

    /// Request a graceful shutdown from outside the run loop
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    fn spawn_background_tasks(&self) {
        {
            let heartbeat = Arc::clone(&self.heartbeat);
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(async move { heartbeat.run(shutdown).await });
        }
        {
            let manager = Arc::clone(&self.manager);
            tokio::spawn(async move { manager.run_heartbeat_sender().await });
        }
        if let Some(discovery) = &self.discovery {
            let discovery = Arc::clone(discovery);
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(e) = discovery.run(shutdown).await {
                    log::warn!("discovery unavailable: {e}");
                }
            });
        }

        // Outgoing pump: drain the queue and fan each message out
        {
            let queue = Arc::clone(&self.queue);
            let manager = Arc::clone(&self.manager);
            tokio::spawn(async move {
                while let Ok(message) = queue.dequeue_outgoing().await {
                    let delivered = manager.broadcast(&message).await;
                    if delivered == 0 {
                        log::warn!("message {} had no connected peers", message.id);
                    }
                }
                log::debug!("outgoing pump stopped");
            });
        }

        // Incoming consumer: deliver received chat to the console and history
        {
            let queue = Arc::clone(&self.queue);
            let history = self.history.clone();
            tokio::spawn(async move {
                while let Ok(message) = queue.dequeue_incoming().await {
                    println!("{message}");
                    if let Some(history) = &history {
                        history.append(&message);
                    }
                }
                log::debug!("incoming consumer stopped");
            });
        }
    }

    /// Turn one network event into application behavior
    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::PeerConnected { peer } => {
                log::info!("connected: {peer}");
                self.endpoints
                    .insert(peer.id.clone(), (peer.address, peer.port));
            }
            NetworkEvent::PeerDisconnected { peer } => {
                log::info!("disconnected: {peer}");
            }
            NetworkEvent::MessageReceived { message, .. } => {
                self.queue.enqueue_incoming(message);
            }
            NetworkEvent::HeartbeatReceived { peer_id } => {
                log::debug!("heartbeat from {peer_id}");
            }
            NetworkEvent::ConnectionFailed { peer_id } => {
                log::warn!("peer {peer_id} is unresponsive");
                self.manager.disconnect(&peer_id);
                if let Some((address, port)) = self.endpoints.get(&peer_id).cloned() {
                    self.spawn_reconnect(peer_id, address, port);
                }
            }
            NetworkEvent::PeerDiscovered {
                peer_id,
                address,
                port,
            } => {
                log::info!("discovered {peer_id} at {address}:{port}");
                self.endpoints
                    .insert(peer_id.clone(), (address.clone(), port));
                // Both sides see each other's broadcasts; the smaller id
                // dials so the pair does not open crossed connections.
                if !self.manager.is_connected(&peer_id) && self.local_id.as_str() < peer_id.as_str()
                {
                    let manager = Arc::clone(&self.manager);
                    tokio::spawn(async move {
                        if let Err(e) = manager.connect_as(Some(peer_id), &address, port).await {
                            log::warn!("could not connect to discovered peer: {e}");
                        }
                    });
                }
            }
            NetworkEvent::PeerLost { peer_id } => {
                log::info!("discovered peer {peer_id} is gone");
            }
            NetworkEvent::ReconnectAttempt { peer_id, attempt } => {
                log::info!("reconnecting to {peer_id}, attempt {attempt}");
            }
            NetworkEvent::ReconnectSucceeded { peer_id } => {
                log::info!("reconnected to {peer_id}");
            }
            NetworkEvent::ReconnectGaveUp { peer_id } => {
                log::warn!("could not reconnect to {peer_id}");
                self.endpoints.remove(&peer_id);
            }
        }
    }

    /// Start a reconnection round for a peer at its last known endpoint
    fn spawn_reconnect(&self, peer_id: String, address: String, port: u16) {
        let manager = Arc::clone(&self.manager);
        let reconnect = Arc::clone(&self.reconnect);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let id = peer_id.clone();
            let connect = move || {
                let manager = Arc::clone(&manager);
                let peer_id = peer_id.clone();
                let address = address.clone();
                async move {
                    manager
                        .connect_as(Some(peer_id), &address, port)
                        .await
                        .is_ok()
                }
            };
            reconnect.try_reconnect(&id, connect, &mut shutdown).await;
        });
    }

    /// Read console commands until quit or shutdown
    fn spawn_command_loop(&self) {
        let manager = Arc::clone(&self.manager);
        let queue = Arc::clone(&self.queue);
        let history = self.history.clone();
        let display_name = self.config.network.display_name.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            println!("Type /help for commands; anything else is sent to all peers.");
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            let mut shutdown_rx = shutdown.subscribe();

            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        let Some(command) = Command::parse(&line) else { continue };
                        match command {
                            Command::Send(text) => {
                                let message = Message::new_chat(&display_name, text);
                                if let Some(history) = &history {
                                    history.append(&message);
                                }
                                queue.enqueue_outgoing(message);
                            }
                            Command::Connect { address, port } => {
                                match manager.connect(&address, port).await {
                                    Ok(peer) => println!("connected to {peer}"),
                                    Err(e) => println!("connect failed: {e}"),
                                }
                            }
                            Command::Peers => {
                                let peers = manager.list_known();
                                if peers.is_empty() {
                                    println!("no connected peers");
                                }
                                for peer in peers {
                                    println!("  {peer}");
                                }
                            }
                            Command::History(limit) => {
                                match &history {
                                    Some(history) => {
                                        for message in history.recent(limit) {
                                            println!("{message}");
                                        }
                                    }
                                    None => println!("history is disabled"),
                                }
                            }
                            Command::Help => print_help(),
                            Command::Quit => {
                                let _ = shutdown.send(true);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Tear everything down: queues first so consumers drain, then sessions
    fn finish(&self) {
        log::info!("shutting down");
        let _ = self.shutdown.send(true);
        self.queue.close();
        self.manager.shutdown_all();
    }
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Send chat text to all connected peers
    Send(String),
    /// Connect to a peer at `address:port`
    Connect { address: String, port: u16 },
    /// List connected peers
    Peers,
    /// Show the most recent history entries (0 = all)
    History(usize),
    /// Show command help
    Help,
    /// Shut the messenger down
    Quit,
}

impl Command {
    /// Parse one console line; blank lines and bad arguments yield `None`
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::Send(line.to_string()));
        }

        let mut parts = line.split_whitespace();
        match parts.next()? {
            "/connect" => {
                let endpoint = parts.next()?;
                let (address, port) = endpoint.rsplit_once(':')?;
                let port: u16 = port.parse().ok()?;
                if address.is_empty() || port == 0 {
                    return None;
                }
                Some(Self::Connect {
                    address: address.to_string(),
                    port,
                })
            }
            "/peers" => Some(Self::Peers),
            "/history" => {
                let limit = match parts.next() {
                    Some(n) => n.parse().ok()?,
                    None => 20,
                };
                Some(Self::History(limit))
            }
            "/help" => Some(Self::Help),
            "/quit" | "/exit" => Some(Self::Quit),
            other => {
                println!("unknown command {other}, try /help");
                None
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /connect HOST:PORT   connect to a peer");
    println!("  /peers               list connected peers");
    println!("  /history [N]         show the last N messages (default 20)");
    println!("  /quit                exit");
    println!("  anything else        send as chat to all peers");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Peer;
    use tempfile::TempDir;

    fn test_app() -> (App, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = MessengerConfig::default();
        config.network.enable_discovery = false;
        config.storage.data_dir = temp_dir.path().to_path_buf();
        config.storage.history_file = temp_dir.path().join("history.json");

        (App::new(config).unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_app_creation() {
        let (app, _dir) = test_app();
        assert_eq!(app.local_id().len(), 8);
        assert!(app.queue().incoming_count() == 0);
    }

    #[tokio::test]
    async fn test_received_message_reaches_incoming_queue() {
        let (mut app, _dir) = test_app();

        app.handle_event(NetworkEvent::MessageReceived {
            peer_id: "bob".to_string(),
            message: Message::new_chat("bob", "hello"),
        });

        let message = app.queue().try_dequeue_incoming().unwrap();
        assert_eq!(message.content, "hello");
    }

    #[tokio::test]
    async fn test_send_message_is_queued_and_recorded() {
        let (app, _dir) = test_app();
        app.send_message("out it goes");

        let message = app.queue().try_dequeue_outgoing().unwrap();
        assert_eq!(message.content, "out it goes");
        assert_eq!(app.history.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connected_endpoint_is_remembered() {
        let (mut app, _dir) = test_app();

        app.handle_event(NetworkEvent::PeerConnected {
            peer: Peer::new("bob", "10.0.0.2", 4040),
        });
        assert_eq!(
            app.endpoints.get("bob"),
            Some(&("10.0.0.2".to_string(), 4040))
        );

        app.handle_event(NetworkEvent::ReconnectGaveUp {
            peer_id: "bob".to_string(),
        });
        assert!(app.endpoints.get("bob").is_none());
    }

    #[test]
    fn test_parse_chat_line() {
        assert_eq!(
            Command::parse("hello there"),
            Some(Command::Send("hello there".to_string()))
        );
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            Command::parse("/connect 192.168.1.5:4040"),
            Some(Command::Connect {
                address: "192.168.1.5".to_string(),
                port: 4040
            })
        );
        assert_eq!(Command::parse("/connect nonsense"), None);
        assert_eq!(Command::parse("/connect host:0"), None);
        assert_eq!(Command::parse("/connect"), None);
    }

    #[test]
    fn test_parse_history() {
        assert_eq!(Command::parse("/history"), Some(Command::History(20)));
        assert_eq!(Command::parse("/history 5"), Some(Command::History(5)));
        assert_eq!(Command::parse("/history nope"), None);
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("/peers"), Some(Command::Peers));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/quit"), Some(Command::Quit));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
    }
}
