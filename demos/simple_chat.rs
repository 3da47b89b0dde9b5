//! Simple chat example demonstrating basic messenger functionality.
//!
//! This example shows how to:
//! - Drive the key-exchange handshake between two in-process endpoints
//! - Seal and open signed, encrypted messages
//! - Run two connection managers over loopback TCP

use secure_messenger::network::{ConnectionManager, HeartbeatMonitor, NetworkEvent};
use secure_messenger::session;
use secure_messenger::transport::{FrameReader, FrameWriter, Message};
use secure_messenger::utils::MessengerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Secure Messenger - Simple Chat Example");
    println!("======================================");

    demo_handshake_and_crypto().await?;
    demo_loopback_session().await?;

    println!("\nDemo completed successfully");
    Ok(())
}

/// Run the handshake over an in-memory duplex stream and exchange a message
async fn demo_handshake_and_crypto() -> Result<(), Box<dyn std::error::Error>> {
    println!("\nHandshake over an in-memory stream:");

    let (client, server) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, server_write) = tokio::io::split(server);

    let connector = tokio::spawn(async move {
        let mut reader = FrameReader::new(client_read);
        let mut writer = FrameWriter::new(client_write);
        session::run_connector(&mut reader, &mut writer).await
    });
    let acceptor = tokio::spawn(async move {
        let mut reader = FrameReader::new(server_read);
        let mut writer = FrameWriter::new(server_write);
        session::run_acceptor(&mut reader, &mut writer).await
    });

    let alice = connector.await??;
    let bob = acceptor.await??;
    println!("  established; bob sees fingerprint {}", bob.peer_fingerprint());

    let sealed = alice.seal(&Message::new_chat("alice", "hello over the wire"))?;
    println!("  sealed message is {} bytes on the wire", sealed.len());

    let opened = bob.open(&sealed)?;
    println!("  bob opened: {opened}");

    Ok(())
}

/// Connect two managers over loopback TCP and deliver a chat message
async fn demo_loopback_session() -> Result<(), Box<dyn std::error::Error>> {
    println!("\nFull session over loopback TCP:");

    let (alice_manager, mut alice_events, _alice_shutdown) = node("alice");
    let (bob_manager, _bob_events, _bob_shutdown) = node("bob");

    let port = alice_manager.listen(0).await?;
    println!("  alice listening on port {port}");

    let alice_peer = bob_manager.connect("127.0.0.1", port).await?;
    println!("  bob connected to {alice_peer}");

    bob_manager
        .send_message(&alice_peer.id, &Message::new_chat("bob", "hi alice!"))
        .await?;

    loop {
        match tokio::time::timeout(Duration::from_secs(5), alice_events.recv()).await? {
            Some(NetworkEvent::MessageReceived { message, .. }) => {
                println!("  alice received: {message}");
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }

    bob_manager.shutdown_all();
    alice_manager.shutdown_all();
    Ok(())
}

fn node(
    name: &str,
) -> (
    Arc<ConnectionManager>,
    mpsc::UnboundedReceiver<NetworkEvent>,
    watch::Sender<bool>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = MessengerConfig::default();
    let heartbeat = Arc::new(HeartbeatMonitor::new(
        Duration::from_secs(config.resilience.heartbeat_timeout),
        event_tx.clone(),
    ));
    let manager = Arc::new(ConnectionManager::new(
        name,
        config,
        event_tx,
        heartbeat,
        shutdown_rx,
    ));
    (manager, event_rx, shutdown_tx)
}
