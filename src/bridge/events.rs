// bridge/events.rs

#![forbid(unsafe_code)]

use serde::Serialize;
use tokio::sync::mpsc;

use crate::bridge::common::ClientId;

/// Payload of one received datagram, as delivered to the host application.
/// `data` carries the raw bytes; the JSON form serializes it as a byte array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePayload {
    pub data: Vec<u8>,
    pub address: String,
    pub port: u16,
}

/// A named device event scoped to one socket identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub name: String,
    pub payload: MessagePayload,
}

impl DeviceEvent {
    pub fn message(id: ClientId, payload: MessagePayload) -> Self {
        Self {
            name: data_event_name(id),
            payload,
        }
    }

    /// Host-boundary JSON form of the payload.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.payload)
    }
}

/// Formats the per-identifier data event name.
pub fn data_event_name(id: ClientId) -> String {
    format!("udp-{id}-data")
}

/// The host framework's device-event emitter seam. The bridge only ever
/// pushes events through this; it never blocks on the host draining them.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DeviceEvent);
}

/// Event sink backed by an unbounded channel, for hosts that drain events
/// from an mpsc receiver.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: DeviceEvent) {
        if let Err(error) = self.tx.send(event) {
            tracing::warn!(%error, "device event dropped, host receiver is gone");
        }
    }
}
