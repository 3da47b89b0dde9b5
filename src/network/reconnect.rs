//! Automatic reconnection with exponential backoff.
//!
//! When a peer with a known address is reported failed, the policy retries
//! the outbound connect up to a bounded number of attempts, doubling the
//! delay between attempts up to a cap. Success resets the attempt counter;
//! exhausting the attempts gives up until a fresh failure event starts a new
//! round.

use crate::network::NetworkEvent;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Bounded exponential-backoff reconnection policy
pub struct ReconnectionPolicy {
    attempts: Mutex<HashMap<String, u32>>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    events: mpsc::UnboundedSender<NetworkEvent>,
}

impl ReconnectionPolicy {
    /// Create a policy with the given bounds
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        events: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            initial_delay,
            max_delay,
            events,
        }
    }

    /// Backoff delay before the given 1-based attempt:
    /// `min(initial * 2^(attempt-1), max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Current attempt count for a peer
    pub fn attempt_count(&self, peer_id: &str) -> u32 {
        self.attempts
            .lock()
            .expect("reconnect lock poisoned")
            .get(peer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Reset a peer's attempt counter (after a successful connection)
    pub fn reset_attempts(&self, peer_id: &str) {
        self.attempts
            .lock()
            .expect("reconnect lock poisoned")
            .remove(peer_id);
    }

    /// Run one reconnection round for a peer.
    ///
    /// `connect` is invoked once per attempt and returns whether the
    /// connection (including its handshake) succeeded. Returns `true` if the
    /// peer was reconnected. Backoff waits observe the shutdown signal, so a
    /// round in progress stops promptly when the process is shutting down.
    pub async fn try_reconnect<F, Fut>(
        &self,
        peer_id: &str,
        mut connect: F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        loop {
            let attempt = {
                let mut attempts = self.attempts.lock().expect("reconnect lock poisoned");
                let count = attempts.entry(peer_id.to_string()).or_insert(0);
                *count += 1;
                *count
            };

            if attempt > self.max_attempts {
                log::warn!(
                    "giving up on {peer_id} after {} attempts",
                    self.max_attempts
                );
                self.reset_attempts(peer_id);
                let _ = self.events.send(NetworkEvent::ReconnectGaveUp {
                    peer_id: peer_id.to_string(),
                });
                return false;
            }

            log::info!(
                "reconnecting to {peer_id} (attempt {attempt}/{})",
                self.max_attempts
            );
            let _ = self.events.send(NetworkEvent::ReconnectAttempt {
                peer_id: peer_id.to_string(),
                attempt,
            });

            if connect().await {
                log::info!("reconnected to {peer_id}");
                self.reset_attempts(peer_id);
                let _ = self.events.send(NetworkEvent::ReconnectSucceeded {
                    peer_id: peer_id.to_string(),
                });
                return true;
            }

            let delay = self.delay_for_attempt(attempt);
            log::debug!("reconnect to {peer_id} failed, retrying in {delay:?}");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown; without this the
                    // select would skip every backoff wait
                    if changed.is_err() || *shutdown.borrow() {
                        log::debug!("reconnect to {peer_id} cancelled by shutdown");
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> (Arc<ReconnectionPolicy>, mpsc::UnboundedReceiver<NetworkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(ReconnectionPolicy::new(
                5,
                Duration::from_secs(1),
                Duration::from_secs(30),
                tx,
            )),
            rx,
        )
    }

    #[test]
    fn test_backoff_schedule() {
        let (policy, _rx) = policy();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(16));
        // Capped at max_delay from here on
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(30));
    }

    #[test]
    fn test_delays_are_non_decreasing_and_bounded() {
        let (policy, _rx) = policy();
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(30));
            previous = delay;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_four_times_then_succeeds() {
        let (policy, mut rx) = policy();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let calls = Arc::new(AtomicU32::new(0));
        let connect = {
            let calls = Arc::clone(&calls);
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { n >= 5 }
            }
        };

        let reconnected = policy.try_reconnect("alice", connect, &mut shutdown_rx).await;

        assert!(reconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(policy.attempt_count("alice"), 0);

        let mut attempts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                NetworkEvent::ReconnectAttempt { attempt, .. } => attempts.push(attempt),
                NetworkEvent::ReconnectSucceeded { peer_id } => assert_eq!(peer_id, "alice"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (policy, mut rx) = policy();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let calls = Arc::new(AtomicU32::new(0));
        let connect = {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { false }
            }
        };

        let reconnected = policy.try_reconnect("alice", connect, &mut shutdown_rx).await;

        assert!(!reconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // A fresh failure event restarts the counter from zero
        assert_eq!(policy.attempt_count("alice"), 0);

        let mut gave_up = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, NetworkEvent::ReconnectGaveUp { .. }) {
                gave_up = true;
            }
        }
        assert!(gave_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_backoff_wait() {
        let (policy, _rx) = policy();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn({
            let policy = Arc::clone(&policy);
            async move {
                policy
                    .try_reconnect("alice", || async { false }, &mut shutdown_rx)
                    .await
            }
        });

        // Let the first attempt fail and enter its backoff sleep
        tokio::task::yield_now().await;
        shutdown_tx.send(true).unwrap();

        let reconnected = handle.await.unwrap();
        assert!(!reconnected);
    }
}
