// bridge/socket.rs

#![forbid(unsafe_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use socket2::{Domain, Protocol, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::bridge::common::{
    current_millis, BindOptions, BridgeError, ClientId, SocketOptions, SocketStats,
    MAX_DATAGRAM_SIZE,
};
use crate::bridge::events::{DeviceEvent, EventSink, MessagePayload};

/// One bridged UDP socket.
///
/// Mirrors the host contract where a socket is constructed first and bound
/// later: until `bind` the entry only carries its creation options, and
/// operations that need a live descriptor fail with `SocketNotBound`.
pub struct BridgeSocket {
    id: ClientId,
    options: SocketOptions,
    socket: Option<Arc<UdpSocket>>,
    reader: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SocketStats>>,
}

impl BridgeSocket {
    pub fn new(id: ClientId, options: SocketOptions) -> Self {
        Self {
            id,
            options,
            socket: None,
            reader: None,
            stats: Arc::new(Mutex::new(SocketStats::default())),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    /// Creates the OS descriptor, binds it and starts the reader task that
    /// forwards every received datagram to the host as a device event.
    ///
    /// socket2 is used for the construct step because neither tokio nor the
    /// standard library can set `SO_REUSEADDR`/`SO_REUSEPORT` on a UDP
    /// socket before binding.
    pub fn bind(
        &mut self,
        addr: SocketAddr,
        options: &BindOptions,
        sink: Arc<dyn EventSink>,
    ) -> Result<SocketAddr, BridgeError> {
        if self.socket.is_some() {
            return Err(BridgeError::AlreadyBound(self.id));
        }

        let raw = socket2::Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        if options.reuse_port {
            raw.set_reuse_address(true)?;
            raw.set_reuse_port(true)?;
        }
        raw.set_nonblocking(true)?;
        raw.bind(&addr.into())?;

        let socket = Arc::new(UdpSocket::from_std(raw.into())?);
        let local_addr = socket.local_addr()?;

        self.reader = Some(spawn_reader(
            self.id,
            Arc::clone(&socket),
            sink,
            Arc::clone(&self.stats),
        ));
        self.socket = Some(socket);

        Ok(local_addr)
    }

    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize, BridgeError> {
        let socket = self.descriptor()?;
        let sent = socket.send_to(data, target).await?;

        let mut stats = self.stats.lock().unwrap();
        stats.datagrams_sent += 1;
        stats.bytes_sent += sent as u64;
        stats.last_activity_ms = current_millis();

        Ok(sent)
    }

    pub fn set_broadcast(&self, flag: bool) -> Result<(), BridgeError> {
        self.descriptor()?.set_broadcast(flag)?;
        Ok(())
    }

    pub fn join_multicast(&self, group: IpAddr) -> Result<(), BridgeError> {
        let socket = self.descriptor()?;
        match group {
            IpAddr::V4(group) => socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(group) => socket.join_multicast_v6(&group, 0)?,
        }
        Ok(())
    }

    pub fn leave_multicast(&self, group: IpAddr) -> Result<(), BridgeError> {
        let socket = self.descriptor()?;
        match group {
            IpAddr::V4(group) => socket.leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(group) => socket.leave_multicast_v6(&group, 0)?,
        }
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.descriptor()?.local_addr()?)
    }

    /// Stops the reader task and releases the descriptor. Safe to call on an
    /// unbound socket.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.socket = None;
    }

    pub fn stats_snapshot(&self) -> SocketStats {
        self.stats.lock().unwrap().clone()
    }

    fn descriptor(&self) -> Result<&Arc<UdpSocket>, BridgeError> {
        self.socket
            .as_ref()
            .ok_or(BridgeError::SocketNotBound(self.id))
    }
}

impl Drop for BridgeSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Receive loop for one bound socket. Each datagram becomes exactly one
/// device event; receive errors are transient on UDP, so they are counted
/// and logged without ending the loop.
fn spawn_reader(
    id: ClientId,
    socket: Arc<UdpSocket>,
    sink: Arc<dyn EventSink>,
    stats: Arc<Mutex<SocketStats>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    {
                        let mut stats = stats.lock().unwrap();
                        stats.datagrams_received += 1;
                        stats.bytes_received += len as u64;
                        stats.last_activity_ms = current_millis();
                    }
                    let payload = MessagePayload {
                        data: buf[..len].to_vec(),
                        address: from.ip().to_string(),
                        port: from.port(),
                    };
                    sink.emit(DeviceEvent::message(id, payload));
                }
                Err(error) => {
                    stats.lock().unwrap().recv_errors += 1;
                    tracing::warn!(id, %error, "udp receive failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::events::ChannelEventSink;
    use tokio::time::{timeout, Duration};

    fn local_any() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    fn null_sink() -> Arc<dyn EventSink> {
        let (sink, _rx) = ChannelEventSink::new();
        Arc::new(sink)
    }

    #[tokio::test]
    async fn test_bind_assigns_port() {
        let mut socket = BridgeSocket::new(1, SocketOptions::default());
        assert!(!socket.is_bound());

        let local = socket.bind(local_any(), &BindOptions::default(), null_sink()).unwrap();
        assert!(socket.is_bound());
        assert_ne!(local.port(), 0);
        assert_eq!(socket.local_addr().unwrap(), local);
    }

    #[tokio::test]
    async fn test_bind_twice_fails() {
        let mut socket = BridgeSocket::new(2, SocketOptions::default());
        socket.bind(local_any(), &BindOptions::default(), null_sink()).unwrap();
        let err = socket
            .bind(local_any(), &BindOptions::default(), null_sink())
            .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyBound(2)));
    }

    #[tokio::test]
    async fn test_unbound_guards() {
        let socket = BridgeSocket::new(3, SocketOptions::default());
        assert!(matches!(
            socket.send_to(b"x", local_any()).await.unwrap_err(),
            BridgeError::SocketNotBound(3)
        ));
        assert!(matches!(
            socket.set_broadcast(true).unwrap_err(),
            BridgeError::SocketNotBound(3)
        ));
        assert!(matches!(
            socket.join_multicast("224.0.0.251".parse().unwrap()).unwrap_err(),
            BridgeError::SocketNotBound(3)
        ));
    }

    #[tokio::test]
    async fn test_send_and_stats() {
        let mut socket = BridgeSocket::new(4, SocketOptions::default());
        socket.bind(local_any(), &BindOptions::default(), null_sink()).unwrap();

        let peer = UdpSocket::bind(local_any()).await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let sent = socket.send_to(b"payload", peer_addr).await.unwrap();
        assert_eq!(sent, 7);

        let mut buf = [0u8; 32];
        let (len, from) = timeout(Duration::from_secs(1), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"payload");
        assert_eq!(from, socket.local_addr().unwrap());

        let stats = socket.stats_snapshot();
        assert_eq!(stats.datagrams_sent, 1);
        assert_eq!(stats.bytes_sent, 7);
    }

    #[tokio::test]
    async fn test_reader_emits_events() {
        let (sink, mut rx) = ChannelEventSink::new();
        let mut socket = BridgeSocket::new(5, SocketOptions::default());
        let local = socket
            .bind(local_any(), &BindOptions::default(), Arc::new(sink))
            .unwrap();

        let peer = UdpSocket::bind(local_any()).await.unwrap();
        peer.send_to(b"inbound", local).await.unwrap();

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.name, "udp-5-data");
        assert_eq!(event.payload.data, b"inbound");
        assert_eq!(event.payload.port, peer.local_addr().unwrap().port());

        let stats = socket.stats_snapshot();
        assert_eq!(stats.datagrams_received, 1);
        assert_eq!(stats.bytes_received, 7);
    }

    #[tokio::test]
    async fn test_close_stops_reader() {
        let (sink, mut rx) = ChannelEventSink::new();
        let mut socket = BridgeSocket::new(6, SocketOptions::default());
        let local = socket
            .bind(local_any(), &BindOptions::default(), Arc::new(sink))
            .unwrap();
        socket.close();
        assert!(!socket.is_bound());

        let peer = UdpSocket::bind(local_any()).await.unwrap();
        // The descriptor is gone; nothing should arrive on the event channel.
        let _ = peer.send_to(b"late", local).await;
        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err() || result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_broadcast() {
        let mut socket = BridgeSocket::new(7, SocketOptions::default());
        socket.bind(local_any(), &BindOptions::default(), null_sink()).unwrap();
        socket.set_broadcast(true).unwrap();
        socket.set_broadcast(false).unwrap();
    }

    #[tokio::test]
    async fn test_reuse_port_bind() {
        let mut first = BridgeSocket::new(8, SocketOptions::default());
        let options = BindOptions {
            reuse_port: true,
            debug: false,
        };
        let local = first.bind(local_any(), &options, null_sink()).unwrap();

        // A second socket may bind the same port when both opted in.
        let mut second = BridgeSocket::new(9, SocketOptions::default());
        second.bind(local, &options, null_sink()).unwrap();
    }
}
