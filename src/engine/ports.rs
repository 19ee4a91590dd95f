//! Port driver abstraction
//!
//! The engine never talks to a MIDI API directly. A [`PortDriver`] enumerates
//! ports and opens connections; closing a connection is dropping its link.

use crate::gateway::GatewayResult;
use crate::session::Port;

/// Receives raw bytes of one inbound message, on the driver's thread
pub type InputCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Open input connection. Dropping it closes the port.
pub trait InputLink: Send {}

/// Open output connection. Dropping it closes the port.
pub trait OutputLink: Send {
    fn send(&mut self, bytes: &[u8]) -> GatewayResult<()>;
}

pub trait PortDriver: Send + Sync {
    /// Driver name for logs
    fn name(&self) -> &str;

    fn input_ports(&self) -> GatewayResult<Vec<Port>>;

    fn output_ports(&self) -> GatewayResult<Vec<Port>>;

    fn open_input(&self, port: &Port, callback: InputCallback) -> GatewayResult<Box<dyn InputLink>>;

    fn open_output(&self, port: &Port) -> GatewayResult<Box<dyn OutputLink>>;
}
