//! Session controller
//!
//! Composition root of the client layer. It owns the single authoritative
//! client copy of the session, recorder and playback state machines, each
//! behind its own actor so requests on one machine apply strictly in issue
//! order, and it wires the event bus to the gateway's inbound stream.
//!
//! Recovery policy is the same for every machine: when the gateway fails,
//! the machine is reset to its default, the failure is logged, returned to
//! the caller and published as a [`Notification`].

mod actor;
mod commands;
mod handle;

#[cfg(test)]
mod tests;

use std::fmt;
use thiserror::Error;

use crate::gateway::GatewayError;

pub use commands::{PlaybackCommand, RecorderCommand, SessionCommand};
pub use handle::SessionController;

/// Parts of the controller that can fail independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Session,
    Recorder,
    Playback,
    /// Outbound traffic (`send_midi_message`)
    Output,
    /// Inbound traffic (`subscribe_midi_events`)
    Events,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Session => "session",
            Component::Recorder => "recorder",
            Component::Playback => "playback",
            Component::Output => "output",
            Component::Events => "events",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{component} command failed: {source}")]
    Gateway {
        component: Component,
        #[source]
        source: GatewayError,
    },

    #[error("recording {0} is loaded in playback; stop playback before deleting it")]
    RecordingInUse(u32),

    #[error("{0} actor is no longer running")]
    ActorGone(Component),
}

impl ControllerError {
    /// The gateway error behind this failure, if any
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            ControllerError::Gateway { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// User-visible failure report
///
/// Distinct from the diagnostic log: this is what a UI shows in a toast or
/// status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub component: Component,
    pub message: String,
}

impl Notification {
    pub(crate) fn failure(component: Component, error: &dyn fmt::Display) -> Self {
        Self {
            component,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.component, self.message)
    }
}
