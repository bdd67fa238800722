// bridge/registry.rs

use std::sync::Arc;

use crate::bridge::common::MODULE_NAME;
use crate::bridge::events::EventSink;
use crate::bridge::module::UdpSocketModule;

/// Constructs the UDP bridge module when the host framework requests it by
/// name. Holds the host invocation context (the device-event sink) that
/// every constructed module is bound to.
pub struct UdpModuleFactory {
    sink: Arc<dyn EventSink>,
}

impl UdpModuleFactory {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn has_module(&self, name: &str) -> bool {
        name == MODULE_NAME
    }

    /// Returns a fresh module for the one recognized name, `None` otherwise.
    /// Each module starts with an empty handle table, so repeated calls are
    /// harmless.
    pub fn create_module(&self, name: &str) -> Option<UdpSocketModule> {
        if self.has_module(name) {
            Some(UdpSocketModule::new(Arc::clone(&self.sink)))
        } else {
            None
        }
    }
}
