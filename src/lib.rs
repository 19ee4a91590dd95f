//! midirc - MIDI remote-control client
//!
//! A typed MIDI 1.0 model, a command gateway to a device engine, and the
//! session controller that keeps the client's copy of the session,
//! recorder and playback state machines.

pub mod bus;
pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod gateway;
pub mod paths;
pub mod playback;
pub mod protocol;
pub mod recorder;
pub mod session;

pub use controller::SessionController;
pub use gateway::{CommandGateway, GatewayError, GatewayResult};
pub use protocol::MidiMessage;
