//! Heartbeat monitoring for connection health.
//!
//! Tracks the last time any frame was seen per peer. A background cycle
//! compares that timestamp against the timeout once per second; a peer that
//! stays silent past the timeout is reported failed exactly once and removed
//! from tracking. Reconnection is the application's decision, driven by the
//! resulting [`NetworkEvent::ConnectionFailed`].

use crate::network::NetworkEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Period of the timeout check cycle
const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks per-peer liveness and reports timeouts
pub struct HeartbeatMonitor {
    last_seen: Mutex<HashMap<String, Instant>>,
    timeout: Duration,
    events: mpsc::UnboundedSender<NetworkEvent>,
}

impl HeartbeatMonitor {
    /// Create a monitor that declares peers dead after `timeout` of silence
    pub fn new(timeout: Duration, events: mpsc::UnboundedSender<NetworkEvent>) -> Self {
        Self {
            last_seen: Mutex::new(HashMap::new()),
            timeout,
            events,
        }
    }

    /// Begin tracking a peer, starting its timer at now
    pub fn start_monitoring(&self, peer_id: &str) {
        self.last_seen
            .lock()
            .expect("heartbeat lock poisoned")
            .insert(peer_id.to_string(), Instant::now());
    }

    /// Stop tracking a peer (on disconnect)
    pub fn stop_monitoring(&self, peer_id: &str) {
        self.last_seen
            .lock()
            .expect("heartbeat lock poisoned")
            .remove(peer_id);
    }

    /// Record an explicit heartbeat ping: reset the timer and notify
    pub fn record_heartbeat(&self, peer_id: &str) {
        self.record_activity(peer_id);
        let _ = self.events.send(NetworkEvent::HeartbeatReceived {
            peer_id: peer_id.to_string(),
        });
    }

    /// Record that any frame arrived from a tracked peer
    pub fn record_activity(&self, peer_id: &str) {
        let mut last_seen = self.last_seen.lock().expect("heartbeat lock poisoned");
        if let Some(seen) = last_seen.get_mut(peer_id) {
            *seen = Instant::now();
        }
    }

    /// Point-in-time liveness query, not a guarantee
    pub fn is_alive(&self, peer_id: &str) -> bool {
        self.last_seen
            .lock()
            .expect("heartbeat lock poisoned")
            .get(peer_id)
            .map(|seen| seen.elapsed() < self.timeout)
            .unwrap_or(false)
    }

    /// Number of currently tracked peers
    pub fn tracked_count(&self) -> usize {
        self.last_seen.lock().expect("heartbeat lock poisoned").len()
    }

    /// Run the timeout check cycle until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_timeouts(),
                changed = shutdown.changed() => {
                    // A dropped sender means the owner is gone; stop too
                    if changed.is_err() || *shutdown.borrow() {
                        log::debug!("heartbeat monitor stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One pass of the check cycle; removal guarantees a single report
    fn check_timeouts(&self) {
        let expired: Vec<String> = {
            let mut last_seen = self.last_seen.lock().expect("heartbeat lock poisoned");
            let timeout = self.timeout;
            let dead: Vec<String> = last_seen
                .iter()
                .filter(|(_, seen)| seen.elapsed() > timeout)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &dead {
                last_seen.remove(id);
            }
            dead
        };

        for peer_id in expired {
            log::warn!("peer {peer_id} heartbeat timeout");
            let _ = self
                .events
                .send(NetworkEvent::ConnectionFailed { peer_id });
        }
    }
}
