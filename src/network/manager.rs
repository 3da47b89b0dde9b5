//! Connection manager: owns the set of active peer sessions.
//!
//! The manager runs the accept loop, performs outbound connects, drives the
//! handshake on both sides, and spawns one receive loop per session. Decrypted
//! messages are reported through the event channel; the application wires
//! them into the incoming queue. Per-session errors are contained to that
//! session's teardown and never crash the manager or other sessions.

use crate::network::{HeartbeatMonitor, NetworkEvent};
use crate::session::{self, SessionCrypto};
use crate::transport::{FrameReader, FrameWriter, Message, Peer};
use crate::utils::{MessengerConfig, MessengerError, NetworkError, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// One active peer session.
///
/// All mutable per-session state lives here, indexed by peer id; sockets are
/// never aliased outside the handle. The writer mutex serializes sends so two
/// frames can never interleave on one socket.
struct SessionHandle {
    peer: Peer,
    crypto: Arc<SessionCrypto>,
    writer: Arc<tokio::sync::Mutex<FrameWriter<OwnedWriteHalf>>>,
    task: Option<tokio::task::JoinHandle<()>>,
    /// Generation token; teardown requests from a replaced session carry
    /// the old value and must not remove its replacement
    epoch: u64,
}

/// Owns all active sessions and the listener
pub struct ConnectionManager {
    local_id: String,
    config: MessengerConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    epoch: AtomicU64,
    events: mpsc::UnboundedSender<NetworkEvent>,
    heartbeat: Arc<HeartbeatMonitor>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionManager {
    /// Create a manager; `local_id` names this node in outgoing messages
    pub fn new(
        local_id: impl Into<String>,
        config: MessengerConfig,
        events: mpsc::UnboundedSender<NetworkEvent>,
        heartbeat: Arc<HeartbeatMonitor>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            config,
            sessions: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            events,
            heartbeat,
            shutdown,
        }
    }

    /// This node's peer id
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Start accepting inbound connections.
    ///
    /// Returns the actual bound port (useful when `port` is 0). A port that
    /// is already bound is reported as an error to the caller, not a process
    /// failure; the manager keeps running without a listener.
    pub async fn listen(self: &Arc<Self>, port: u16) -> Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            NetworkError::ListenFailed {
                port,
                reason: e.to_string(),
            }
        })?;
        let bound_port = listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(port);
        log::info!("listening on port {bound_port}");

        let manager = Arc::clone(self);
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            let manager = Arc::clone(&manager);
                            tokio::spawn(async move {
                                if let Err(e) = manager.handle_inbound(stream, addr).await {
                                    log::warn!("inbound connection from {addr} failed: {e}");
                                }
                            });
                        }
                        Err(e) => log::warn!("accept failed: {e}"),
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            log::debug!("accept loop stopping");
                            break;
                        }
                    }
                }
            }
        });

        Ok(bound_port)
    }

    /// Accept one inbound connection: handshake as acceptor, then register
    async fn handle_inbound(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);

        let handshake_timeout = Duration::from_secs(self.config.network.connect_timeout);
        let crypto = tokio::time::timeout(
            handshake_timeout,
            session::run_acceptor(&mut reader, &mut writer),
        )
        .await
        .map_err(|_| NetworkError::Timeout {
            operation: format!("handshake with {addr}"),
        })??;

        let peer = Peer::new(short_id(), addr.ip().to_string(), addr.port());
        log::info!("accepted {} (fingerprint {})", peer, crypto.peer_fingerprint());
        self.register_session(peer, crypto, reader, writer);
        Ok(())
    }

    /// Open an outbound connection to a peer.
    ///
    /// Does not return until the handshake has succeeded or failed; on
    /// success the session is Established and its receive loop is running.
    pub async fn connect(self: &Arc<Self>, address: &str, port: u16) -> Result<Peer> {
        self.connect_as(None, address, port).await
    }

    /// Outbound connect reusing a known peer id (discovery and reconnects)
    pub async fn connect_as(
        self: &Arc<Self>,
        peer_id: Option<String>,
        address: &str,
        port: u16,
    ) -> Result<Peer> {
        let endpoint = format!("{address}:{port}");
        let connect_timeout = Duration::from_secs(self.config.network.connect_timeout);

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| NetworkError::Timeout {
                operation: format!("connect to {endpoint}"),
            })?
            .map_err(|e| NetworkError::ConnectionFailed {
                peer: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);

        let crypto = tokio::time::timeout(
            connect_timeout,
            session::run_connector(&mut reader, &mut writer),
        )
        .await
        .map_err(|_| NetworkError::Timeout {
            operation: format!("handshake with {endpoint}"),
        })??;

        let peer = Peer::new(
            peer_id.unwrap_or_else(short_id),
            address.to_string(),
            port,
        );
        log::info!("connected to {} (fingerprint {})", peer, crypto.peer_fingerprint());
        Ok(self.register_session(peer, crypto, reader, writer))
    }

    /// Insert a session into the active set and start its receive loop
    fn register_session(
        self: &Arc<Self>,
        peer: Peer,
        crypto: SessionCrypto,
        reader: FrameReader<OwnedReadHalf>,
        writer: FrameWriter<OwnedWriteHalf>,
    ) -> Peer {
        // A peer id maps to at most one active session
        self.teardown_session(&peer.id, true, None);

        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let crypto = Arc::new(crypto);
        let handle = SessionHandle {
            peer: peer.clone(),
            crypto: Arc::clone(&crypto),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            task: None,
            epoch,
        };
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(peer.id.clone(), handle);

        let task = tokio::spawn(Self::receive_loop(
            Arc::clone(self),
            peer.id.clone(),
            epoch,
            reader,
            crypto,
            self.shutdown.clone(),
        ));
        if let Some(handle) = self
            .sessions
            .lock()
            .expect("session lock poisoned")
            .get_mut(&peer.id)
        {
            handle.task = Some(task);
        }

        self.heartbeat.start_monitoring(&peer.id);
        let _ = self.events.send(NetworkEvent::PeerConnected { peer: peer.clone() });
        peer
    }

    /// Per-session receive loop; one concurrent task per session
    async fn receive_loop(
        manager: Arc<Self>,
        peer_id: String,
        epoch: u64,
        mut reader: FrameReader<OwnedReadHalf>,
        crypto: Arc<SessionCrypto>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                frame = reader.receive_frame() => match frame {
                    Ok(payload) => {
                        manager.heartbeat.record_activity(&peer_id);
                        match crypto.open(&payload) {
                            Ok(message) if message.is_heartbeat() => {
                                manager.heartbeat.record_heartbeat(&peer_id);
                            }
                            Ok(message) => {
                                log::debug!("message {} from {peer_id}", message.id);
                                let _ = manager.events.send(NetworkEvent::MessageReceived {
                                    peer_id: peer_id.clone(),
                                    message,
                                });
                            }
                            Err(e) if e.is_security_violation() => {
                                // Drop the offending message, keep the session
                                log::warn!("dropping unverifiable message from {peer_id}: {e}");
                            }
                            Err(e) if e.is_session_fatal() => {
                                log::warn!("protocol error on session {peer_id}: {e}");
                                manager.teardown_session(&peer_id, false, Some(epoch));
                                break;
                            }
                            Err(e) => {
                                log::warn!("dropping undecodable message from {peer_id}: {e}");
                            }
                        }
                    }
                    Err(MessengerError::StreamClosed) => {
                        log::info!("peer {peer_id} closed the connection");
                        manager.teardown_session(&peer_id, false, Some(epoch));
                        break;
                    }
                    Err(e) => {
                        log::warn!("receive error on session {peer_id}: {e}");
                        manager.teardown_session(&peer_id, false, Some(epoch));
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Send a message to one peer.
    ///
    /// Unknown peers are a reported failure, never a fault.
    pub async fn send_message(&self, peer_id: &str, message: &Message) -> Result<()> {
        let (crypto, writer, epoch) = {
            let sessions = self.sessions.lock().expect("session lock poisoned");
            let handle = sessions
                .get(peer_id)
                .ok_or_else(|| NetworkError::PeerNotFound {
                    peer_id: peer_id.to_string(),
                })?;
            (
                Arc::clone(&handle.crypto),
                Arc::clone(&handle.writer),
                handle.epoch,
            )
        };

        let payload = crypto.seal(message)?;
        let result = writer.lock().await.send_frame(&payload).await;
        if let Err(e) = &result {
            if e.is_session_fatal() {
                log::warn!("send to {peer_id} failed, tearing session down: {e}");
                self.teardown_session(peer_id, true, Some(epoch));
            }
        }
        result
    }

    /// Send a message to every active session, returning the success count
    pub async fn broadcast(&self, message: &Message) -> usize {
        let peer_ids: Vec<String> = {
            let sessions = self.sessions.lock().expect("session lock poisoned");
            sessions.keys().cloned().collect()
        };

        let mut delivered = 0;
        for peer_id in peer_ids {
            match self.send_message(&peer_id, message).await {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("broadcast to {peer_id} failed: {e}"),
            }
        }
        delivered
    }

    /// Close a session and remove it from the active set. Idempotent.
    pub fn disconnect(&self, peer_id: &str) {
        self.teardown_session(peer_id, true, None);
    }

    /// Remove a session; fires the disconnected event exactly once because
    /// removal from the map is the guard. `abort_task` must be false when
    /// called from the session's own receive loop.
    ///
    /// Teardown on behalf of a specific session passes its epoch; if the map
    /// entry has since been replaced by a newer session with the same peer id,
    /// the stale request leaves the replacement alone. `None` removes
    /// unconditionally (external disconnects and shutdown).
    fn teardown_session(&self, peer_id: &str, abort_task: bool, epoch: Option<u64>) {
        let handle = {
            let mut sessions = self.sessions.lock().expect("session lock poisoned");
            match sessions.get(peer_id) {
                Some(handle) if epoch.map_or(true, |e| handle.epoch == e) => {
                    sessions.remove(peer_id)
                }
                _ => None,
            }
        };

        if let Some(mut handle) = handle {
            if abort_task {
                if let Some(task) = handle.task.take() {
                    task.abort();
                }
            }
            self.heartbeat.stop_monitoring(peer_id);
            handle.peer.is_connected = false;
            log::info!("session {peer_id} torn down");
            let _ = self.events.send(NetworkEvent::PeerDisconnected { peer: handle.peer });
        }
    }

    /// Disconnect every active session (process shutdown)
    pub fn shutdown_all(&self) {
        let peer_ids: Vec<String> = {
            let sessions = self.sessions.lock().expect("session lock poisoned");
            sessions.keys().cloned().collect()
        };
        for peer_id in peer_ids {
            self.teardown_session(&peer_id, true, None);
        }
    }

    /// Consistent point-in-time snapshot of active peers
    pub fn list_known(&self) -> Vec<Peer> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .values()
            .map(|handle| handle.peer.clone())
            .collect()
    }

    /// Look up one active peer
    pub fn peer_info(&self, peer_id: &str) -> Option<Peer> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(peer_id)
            .map(|handle| handle.peer.clone())
    }

    /// Whether a peer currently has an active session
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .contains_key(peer_id)
    }

    /// Periodically send liveness pings to every active session
    pub async fn run_heartbeat_sender(self: &Arc<Self>) {
        let interval = Duration::from_secs(self.config.resilience.heartbeat_interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ping = Message::new_heartbeat(&self.local_id);
                    self.broadcast(&ping).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::debug!("heartbeat sender stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Short random peer id, used when a peer's stable id is not yet known
fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(10);

    struct TestNode {
        manager: Arc<ConnectionManager>,
        heartbeat: Arc<HeartbeatMonitor>,
        events: mpsc::UnboundedReceiver<NetworkEvent>,
        shutdown: watch::Sender<bool>,
    }

    fn node(name: &str) -> TestNode {
        let config = MessengerConfig::default();
        let timeout = Duration::from_secs(config.resilience.heartbeat_timeout);
        node_with_timeout(name, timeout)
    }

    fn node_with_timeout(name: &str, heartbeat_timeout: Duration) -> TestNode {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = MessengerConfig::default();
        let heartbeat = Arc::new(HeartbeatMonitor::new(heartbeat_timeout, event_tx.clone()));
        let manager = Arc::new(ConnectionManager::new(
            name,
            config,
            event_tx,
            Arc::clone(&heartbeat),
            shutdown_rx,
        ));
        TestNode {
            manager,
            heartbeat,
            events,
            shutdown: shutdown_tx,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<NetworkEvent>) -> NetworkEvent {
        timeout(WAIT, events.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_listen_connect_send_receive() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let alice_peer = bob.manager.connect("127.0.0.1", port).await.unwrap();

        // Both sides report the connection
        assert!(matches!(
            next_event(&mut bob.events).await,
            NetworkEvent::PeerConnected { .. }
        ));
        assert!(matches!(
            next_event(&mut alice.events).await,
            NetworkEvent::PeerConnected { .. }
        ));

        let hello = Message::new_chat("bob", "hello");
        bob.manager.send_message(&alice_peer.id, &hello).await.unwrap();

        match next_event(&mut alice.events).await {
            NetworkEvent::MessageReceived { message, .. } => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.sender, "bob");
                assert!(message.signature.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bidirectional_traffic() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let alice_peer = bob.manager.connect("127.0.0.1", port).await.unwrap();

        next_event(&mut bob.events).await;
        let bob_peer = match next_event(&mut alice.events).await {
            NetworkEvent::PeerConnected { peer } => peer,
            other => panic!("unexpected event: {other:?}"),
        };

        bob.manager
            .send_message(&alice_peer.id, &Message::new_chat("bob", "ping"))
            .await
            .unwrap();
        alice
            .manager
            .send_message(&bob_peer.id, &Message::new_chat("alice", "pong"))
            .await
            .unwrap();

        match next_event(&mut alice.events).await {
            NetworkEvent::MessageReceived { message, .. } => assert_eq!(message.content, "ping"),
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut bob.events).await {
            NetworkEvent::MessageReceived { message, .. } => assert_eq!(message.content, "pong"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_is_reported_failure() {
        let bob = node("bob");
        let result = bob
            .manager
            .send_message("nobody", &Message::new_chat("bob", "hi"))
            .await;
        assert!(matches!(
            result,
            Err(MessengerError::Network(NetworkError::PeerNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_host_fails() {
        let bob = node("bob");
        // Port 1 on loopback should refuse immediately
        let result = bob.manager.connect("127.0.0.1", 1).await;
        assert!(result.is_err());
        assert!(bob.manager.list_known().is_empty());
    }

    #[tokio::test]
    async fn test_listen_port_conflict_is_reported() {
        let alice = node("alice");
        let bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let result = bob.manager.listen(port).await;
        assert!(matches!(
            result,
            Err(MessengerError::Network(NetworkError::ListenFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_fires_exactly_once() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let alice_peer = bob.manager.connect("127.0.0.1", port).await.unwrap();
        next_event(&mut bob.events).await;

        bob.manager.disconnect(&alice_peer.id);
        bob.manager.disconnect(&alice_peer.id);

        assert!(matches!(
            next_event(&mut bob.events).await,
            NetworkEvent::PeerDisconnected { .. }
        ));
        // No duplicate disconnect event queued
        assert!(bob.events.try_recv().is_err());
        assert!(!bob.manager.is_connected(&alice_peer.id));
    }

    #[tokio::test]
    async fn test_peer_death_detected_by_remote() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let alice_peer = bob.manager.connect("127.0.0.1", port).await.unwrap();
        next_event(&mut bob.events).await;
        next_event(&mut alice.events).await;

        // Bob drops the socket; Alice's receive loop sees StreamClosed
        bob.manager.disconnect(&alice_peer.id);

        match next_event(&mut alice.events).await {
            NetworkEvent::PeerDisconnected { peer } => assert!(!peer.is_connected),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(alice.manager.list_known().is_empty());
    }

    #[tokio::test]
    async fn test_list_known_snapshot() {
        let mut alice = node("alice");
        let mut bob = node("bob");
        let mut carol = node("carol");

        let port = alice.manager.listen(0).await.unwrap();
        bob.manager.connect("127.0.0.1", port).await.unwrap();
        carol.manager.connect("127.0.0.1", port).await.unwrap();

        next_event(&mut alice.events).await;
        next_event(&mut alice.events).await;
        next_event(&mut bob.events).await;
        next_event(&mut carol.events).await;

        let known = alice.manager.list_known();
        assert_eq!(known.len(), 2);
        assert!(known.iter().all(|p| p.is_connected));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let mut alice = node("alice");
        let mut bob = node("bob");
        let mut carol = node("carol");

        let port = alice.manager.listen(0).await.unwrap();
        let a_for_bob = bob.manager.connect("127.0.0.1", port).await.unwrap();
        let a_for_carol = carol.manager.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(a_for_bob.endpoint(), a_for_carol.endpoint());

        next_event(&mut alice.events).await;
        next_event(&mut alice.events).await;
        next_event(&mut bob.events).await;
        next_event(&mut carol.events).await;

        let delivered = alice
            .manager
            .broadcast(&Message::new_chat("alice", "to everyone"))
            .await;
        assert_eq!(delivered, 2);

        match next_event(&mut bob.events).await {
            NetworkEvent::MessageReceived { message, .. } => {
                assert_eq!(message.content, "to everyone");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut carol.events).await {
            NetworkEvent::MessageReceived { message, .. } => {
                assert_eq!(message.content, "to everyone");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_heartbeats_are_not_delivered_as_messages() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let alice_peer = bob.manager.connect("127.0.0.1", port).await.unwrap();
        next_event(&mut bob.events).await;
        next_event(&mut alice.events).await;

        bob.manager
            .send_message(&alice_peer.id, &Message::new_heartbeat("bob"))
            .await
            .unwrap();
        bob.manager
            .send_message(&alice_peer.id, &Message::new_chat("bob", "after ping"))
            .await
            .unwrap();

        // The heartbeat surfaces as a liveness event, not a message
        match next_event(&mut alice.events).await {
            NetworkEvent::HeartbeatReceived { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut alice.events).await {
            NetworkEvent::MessageReceived { message, .. } => {
                assert_eq!(message.content, "after ping");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_all_clears_sessions() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        bob.manager.connect("127.0.0.1", port).await.unwrap();
        next_event(&mut bob.events).await;
        next_event(&mut alice.events).await;

        bob.manager.shutdown_all();
        assert!(bob.manager.list_known().is_empty());
        assert!(matches!(
            next_event(&mut bob.events).await,
            NetworkEvent::PeerDisconnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_teardown_spares_replacement_session() {
        let mut alice = node("alice");
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        let alice_peer = bob.manager.connect("127.0.0.1", port).await.unwrap();
        next_event(&mut bob.events).await;

        let old_epoch = {
            let sessions = bob.manager.sessions.lock().unwrap();
            sessions.get(&alice_peer.id).unwrap().epoch
        };

        // Reconnect under the same peer id, replacing the first session
        bob.manager
            .connect_as(Some(alice_peer.id.clone()), "127.0.0.1", port)
            .await
            .unwrap();
        assert!(bob.manager.is_connected(&alice_peer.id));

        // A teardown request left over from the replaced session must not
        // remove the session that replaced it
        bob.manager
            .teardown_session(&alice_peer.id, false, Some(old_epoch));
        assert!(bob.manager.is_connected(&alice_peer.id));

        // An unconditional teardown still removes the current session
        bob.manager.teardown_session(&alice_peer.id, true, None);
        assert!(!bob.manager.is_connected(&alice_peer.id));
    }

    #[tokio::test]
    async fn test_silent_peer_reported_failed_by_heartbeat() {
        let mut alice = node_with_timeout("alice", Duration::from_millis(500));
        let mut bob = node("bob");

        let port = alice.manager.listen(0).await.unwrap();
        bob.manager.connect("127.0.0.1", port).await.unwrap();
        next_event(&mut bob.events).await;
        let bob_peer = match next_event(&mut alice.events).await {
            NetworkEvent::PeerConnected { peer } => peer,
            other => panic!("unexpected event: {other:?}"),
        };

        // Bob keeps his socket open but never sends a frame; only the
        // timeout cycle can notice him
        let monitor_task = {
            let heartbeat = Arc::clone(&alice.heartbeat);
            let shutdown = alice.shutdown.subscribe();
            tokio::spawn(async move { heartbeat.run(shutdown).await })
        };

        match next_event(&mut alice.events).await {
            NetworkEvent::ConnectionFailed { peer_id } => assert_eq!(peer_id, bob_peer.id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!alice.heartbeat.is_alive(&bob_peer.id));

        alice.shutdown.send(true).unwrap();
        monitor_task.await.unwrap();
    }
}
