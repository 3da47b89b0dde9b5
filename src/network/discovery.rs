//! LAN peer discovery over UDP broadcast.
//!
//! Each node periodically broadcasts a `PEER:{id}:{port}` announcement on the
//! discovery port and listens for announcements from others. Candidates are
//! reported through the event channel; connecting to one is the application's
//! decision. A candidate that stops announcing is forgotten after a staleness
//! window.

use crate::network::NetworkEvent;
use crate::utils::{NetworkError, Result};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

/// How long a candidate may stay silent before it is forgotten
const STALE_AFTER: Duration = Duration::from_secs(30);

/// A candidate seen on the local network
struct DiscoveredPeer {
    address: String,
    port: u16,
    last_seen: Instant,
}

/// Broadcasts our presence and tracks announcing peers
pub struct PeerDiscovery {
    local_id: String,
    announce_port: u16,
    discovery_port: u16,
    interval: Duration,
    known: Mutex<HashMap<String, DiscoveredPeer>>,
    events: mpsc::UnboundedSender<NetworkEvent>,
}

impl PeerDiscovery {
    /// Create a discovery service announcing `announce_port` as our TCP port
    pub fn new(
        local_id: impl Into<String>,
        announce_port: u16,
        discovery_port: u16,
        interval: Duration,
        events: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            announce_port,
            discovery_port,
            interval,
            known: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Candidates currently considered present: `(id, address, port)`
    pub fn known_peers(&self) -> Vec<(String, String, u16)> {
        self.known
            .lock()
            .expect("discovery lock poisoned")
            .iter()
            .map(|(id, peer)| (id.clone(), peer.address.clone(), peer.port))
            .collect()
    }

    /// Run announce, receive, and eviction cycles until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.discovery_port))
            .await
            .map_err(|e| NetworkError::DiscoveryFailed {
                reason: format!("bind port {}: {e}", self.discovery_port),
            })?;
        socket
            .set_broadcast(true)
            .map_err(|e| NetworkError::DiscoveryFailed {
                reason: format!("enable broadcast: {e}"),
            })?;
        log::info!("discovery listening on udp port {}", self.discovery_port);

        let announcement = format!("PEER:{}:{}", self.local_id, self.announce_port);
        let broadcast = (Ipv4Addr::BROADCAST, self.discovery_port);
        let mut announce = tokio::time::interval(self.interval);
        announce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut buf = [0u8; 256];

        loop {
            tokio::select! {
                _ = announce.tick() => {
                    if let Err(e) = socket.send_to(announcement.as_bytes(), broadcast).await {
                        log::warn!("discovery announce failed: {e}");
                    }
                    self.evict_stale();
                }
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        if let Ok(text) = std::str::from_utf8(&buf[..len]) {
                            self.handle_announcement(text, addr.ip());
                        }
                    }
                    Err(e) => log::warn!("discovery receive failed: {e}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::debug!("discovery stopping");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Process one announcement; our own broadcasts are ignored
    fn handle_announcement(&self, text: &str, source: IpAddr) {
        let Some((peer_id, port)) = parse_announcement(text) else {
            log::debug!("ignoring malformed announcement: {text:?}");
            return;
        };
        if peer_id == self.local_id {
            return;
        }

        let address = source.to_string();
        let is_new = {
            let mut known = self.known.lock().expect("discovery lock poisoned");
            let previous = known.insert(
                peer_id.to_string(),
                DiscoveredPeer {
                    address: address.clone(),
                    port,
                    last_seen: Instant::now(),
                },
            );
            previous.is_none()
        };

        if is_new {
            log::info!("discovered peer {peer_id} at {address}:{port}");
            let _ = self.events.send(NetworkEvent::PeerDiscovered {
                peer_id: peer_id.to_string(),
                address,
                port,
            });
        }
    }

    /// Forget candidates that stopped announcing; removal reports each once
    fn evict_stale(&self) {
        let stale: Vec<String> = {
            let mut known = self.known.lock().expect("discovery lock poisoned");
            let dead: Vec<String> = known
                .iter()
                .filter(|(_, peer)| peer.last_seen.elapsed() > STALE_AFTER)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &dead {
                known.remove(id);
            }
            dead
        };

        for peer_id in stale {
            log::info!("discovered peer {peer_id} went silent");
            let _ = self.events.send(NetworkEvent::PeerLost { peer_id });
        }
    }
}

/// Parse a `PEER:{id}:{port}` announcement
fn parse_announcement(text: &str) -> Option<(&str, u16)> {
    let rest = text.strip_prefix("PEER:")?;
    let (id, port) = rest.rsplit_once(':')?;
    if id.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        return None;
    }
    Some((id, port))
}
