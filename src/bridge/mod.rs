// bridge/mod.rs

pub mod common;
pub mod events;
pub mod module;
pub mod registry;
pub mod socket;

pub use common::{BindOptions, BoundAddress, BridgeError, ClientId, SocketOptions, MODULE_NAME};
pub use events::{data_event_name, ChannelEventSink, DeviceEvent, EventSink, MessagePayload};
pub use module::UdpSocketModule;
pub use registry::UdpModuleFactory;
