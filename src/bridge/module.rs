// bridge/module.rs

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bridge::common::{
    BindOptions, BoundAddress, BridgeError, ClientId, SocketOptions, SocketStats,
};
use crate::bridge::events::EventSink;
use crate::bridge::socket::BridgeSocket;

/// Forwarding module translating host-framework calls into OS socket calls.
///
/// Owns the handle table: one caller-chosen identifier maps to at most one
/// open socket. Every operation returns `Result`; the host boundary
/// collapses errors to their message string.
pub struct UdpSocketModule {
    sockets: RwLock<HashMap<ClientId, BridgeSocket>>,
    sink: Arc<dyn EventSink>,
}

impl UdpSocketModule {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sockets: RwLock::new(HashMap::new()),
            sink,
        }
    }

    /// Registers a new socket under `id`. The socket holds its options only
    /// until `bind` creates the descriptor.
    pub async fn create_socket(
        &self,
        id: ClientId,
        options: SocketOptions,
    ) -> Result<(), BridgeError> {
        let mut sockets = self.sockets.write().await;
        if sockets.contains_key(&id) {
            tracing::error!(id, "create_socket called twice with the same id");
            return Err(BridgeError::SocketExists(id));
        }
        tracing::debug!(id, kind = ?options.kind, "udp socket created");
        sockets.insert(id, BridgeSocket::new(id, options));
        Ok(())
    }

    /// Binds the socket to (address, port) and starts delivering inbound
    /// datagrams as `udp-<id>-data` events. Reports completion once, after
    /// the OS bind finished, with the address actually assigned.
    pub async fn bind(
        &self,
        id: ClientId,
        port: u16,
        address: &str,
        options: BindOptions,
    ) -> Result<BoundAddress, BridgeError> {
        let ip: IpAddr = address.parse()?;
        if options.debug {
            tracing::debug!(id, %ip, port, ?options, "bind requested");
        }

        let mut sockets = self.sockets.write().await;
        let socket = sockets
            .get_mut(&id)
            .ok_or(BridgeError::SocketNotFound(id))?;

        let local = socket.bind(SocketAddr::new(ip, port), &options, Arc::clone(&self.sink))?;
        tracing::info!(id, %local, "udp socket bound");
        Ok(BoundAddress {
            address: local.ip().to_string(),
            port: local.port(),
        })
    }

    /// Closes the socket and removes its table entry. A second close on the
    /// same id reports `SocketNotFound`.
    pub async fn close(&self, id: ClientId) -> Result<(), BridgeError> {
        let mut sockets = self.sockets.write().await;
        let mut socket = sockets
            .remove(&id)
            .ok_or(BridgeError::SocketNotFound(id))?;
        socket.close();
        tracing::info!(id, "udp socket closed");
        Ok(())
    }

    /// Sends `msg` unaltered to (address, port).
    pub async fn send(
        &self,
        id: ClientId,
        msg: &[u8],
        port: u16,
        address: &str,
    ) -> Result<(), BridgeError> {
        let target = SocketAddr::new(address.parse()?, port);

        let sockets = self.sockets.read().await;
        let socket = sockets.get(&id).ok_or(BridgeError::SocketNotFound(id))?;
        if let Err(error) = socket.send_to(msg, target).await {
            tracing::error!(id, %target, %error, "udp send failed");
            return Err(error);
        }
        Ok(())
    }

    /// Forwards the broadcast flag to the OS socket option.
    pub async fn set_broadcast(&self, id: ClientId, flag: bool) -> Result<(), BridgeError> {
        let sockets = self.sockets.read().await;
        let socket = sockets.get(&id).ok_or(BridgeError::SocketNotFound(id))?;
        match socket.set_broadcast(flag) {
            Ok(()) => {
                tracing::info!(id, flag, "broadcast option set");
                Ok(())
            }
            Err(error) => {
                tracing::error!(id, flag, %error, "set broadcast failed");
                Err(error)
            }
        }
    }

    /// Joins the multicast group named by `multicast_interface`.
    pub async fn add_membership(
        &self,
        id: ClientId,
        multicast_interface: &str,
    ) -> Result<(), BridgeError> {
        let sockets = self.sockets.read().await;
        let socket = sockets.get(&id).ok_or(BridgeError::SocketNotFound(id))?;
        let group: IpAddr = multicast_interface.parse()?;
        match socket.join_multicast(group) {
            Ok(()) => {
                tracing::info!(id, %group, "multicast membership added");
                Ok(())
            }
            Err(error) => {
                tracing::error!(id, %group, %error, "add membership failed");
                Err(error)
            }
        }
    }

    /// Leaves the multicast group named by `multicast_interface`.
    pub async fn drop_membership(
        &self,
        id: ClientId,
        multicast_interface: &str,
    ) -> Result<(), BridgeError> {
        let sockets = self.sockets.read().await;
        let socket = sockets.get(&id).ok_or(BridgeError::SocketNotFound(id))?;
        let group: IpAddr = multicast_interface.parse()?;
        match socket.leave_multicast(group) {
            Ok(()) => {
                tracing::info!(id, %group, "multicast membership dropped");
                Ok(())
            }
            Err(error) => {
                tracing::error!(id, %group, %error, "drop membership failed");
                Err(error)
            }
        }
    }

    /// Module teardown: closes every socket before clearing the table.
    pub async fn teardown(&self) {
        let mut sockets = self.sockets.write().await;
        let count = sockets.len();
        for (_, mut socket) in sockets.drain() {
            socket.close();
        }
        tracing::info!(count, "udp bridge torn down");
    }

    pub async fn stats(&self, id: ClientId) -> Result<SocketStats, BridgeError> {
        let sockets = self.sockets.read().await;
        let socket = sockets.get(&id).ok_or(BridgeError::SocketNotFound(id))?;
        Ok(socket.stats_snapshot())
    }

    pub async fn socket_count(&self) -> usize {
        self.sockets.read().await.len()
    }
}
