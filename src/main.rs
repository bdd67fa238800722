// main.rs
//
// Loopback demonstration of the UDP bridge: resolve the module through the
// factory, open and bind a socket, send a datagram to it from a peer, and
// print the device event the host would receive.

use std::error::Error;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};
use tracing_subscriber::EnvFilter;

use udp_bridge::bridge::{
    BindOptions, ChannelEventSink, SocketOptions, UdpModuleFactory, MODULE_NAME,
};

const DEMO_SOCKET_ID: u32 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (sink, mut events) = ChannelEventSink::new();
    let factory = UdpModuleFactory::new(Arc::new(sink));
    let module = factory
        .create_module(MODULE_NAME)
        .ok_or("module not provided by this package")?;

    module
        .create_socket(DEMO_SOCKET_ID, SocketOptions::default())
        .await?;
    let bound = module
        .bind(DEMO_SOCKET_ID, 0, "127.0.0.1", BindOptions::default())
        .await?;
    tracing::info!(address = %bound.address, port = bound.port, "bridge socket listening");

    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    peer.send_to(b"hello from the peer", (bound.address.as_str(), bound.port))
        .await?;

    let event = timeout(Duration::from_secs(1), events.recv())
        .await?
        .ok_or("event channel closed")?;
    println!("{} -> {}", event.name, event.payload_json()?);

    module.teardown().await;
    Ok(())
}
