//! MIDI port catalog and connection model
//!
//! A [`Session`] is the client's snapshot of what the backend enumerated and
//! which ports it currently holds open.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An enumerated MIDI port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Backend-assigned opaque identifier
    pub id: String,
    /// Human readable port name
    pub name: String,
}

impl Port {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)
    }
}

/// Which side of the session a port belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Port availability and connection status
///
/// A connected port may be missing from the available list when the device
/// disappeared after the connection was made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub available_input_ports: Vec<Port>,
    pub available_output_ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_connection: Option<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_connection: Option<Port>,
}

impl Session {
    pub fn available(&self, direction: PortDirection) -> &[Port] {
        match direction {
            PortDirection::Input => &self.available_input_ports,
            PortDirection::Output => &self.available_output_ports,
        }
    }

    pub fn connection(&self, direction: PortDirection) -> Option<&Port> {
        match direction {
            PortDirection::Input => self.input_connection.as_ref(),
            PortDirection::Output => self.output_connection.as_ref(),
        }
    }

    pub fn is_connected(&self, direction: PortDirection) -> bool {
        self.connection(direction).is_some()
    }

    /// Look up a port id in the last enumerated catalog
    pub fn find(&self, direction: PortDirection, port_id: &str) -> Option<&Port> {
        self.available(direction).iter().find(|p| p.id == port_id)
    }

    /// First available port whose name contains `pattern` (case-insensitive)
    pub fn find_by_name(&self, direction: PortDirection, pattern: &str) -> Option<&Port> {
        let pattern = pattern.to_lowercase();
        self.available(direction)
            .iter()
            .find(|p| p.name.to_lowercase().contains(&pattern))
    }

    /// True when the connection references a port no longer enumerated
    pub fn is_connection_stale(&self, direction: PortDirection) -> bool {
        self.connection(direction)
            .map(|port| self.find(direction, &port.id).is_none())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            available_input_ports: vec![Port::new("in-1", "Keystation 49"), Port::new("in-2", "IAC Bus")],
            available_output_ports: vec![Port::new("out-1", "Synth")],
            input_connection: Some(Port::new("in-9", "Unplugged")),
            output_connection: None,
        }
    }

    #[test]
    fn test_default_is_empty() {
        let session = Session::default();
        assert!(session.available_input_ports.is_empty());
        assert!(session.available_output_ports.is_empty());
        assert!(!session.is_connected(PortDirection::Input));
        assert!(!session.is_connected(PortDirection::Output));
    }

    #[test]
    fn test_lookups() {
        let session = sample();
        assert_eq!(
            session.find(PortDirection::Input, "in-2").map(|p| p.name.as_str()),
            Some("IAC Bus")
        );
        assert!(session.find(PortDirection::Output, "in-2").is_none());
        assert_eq!(
            session.find_by_name(PortDirection::Input, "keystation").map(|p| p.id.as_str()),
            Some("in-1")
        );
        assert!(session.is_connection_stale(PortDirection::Input));
        assert!(!session.is_connection_stale(PortDirection::Output));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["availableInputPorts"][0]["id"], "in-1");
        assert_eq!(json["inputConnection"]["name"], "Unplugged");
        assert!(json.get("outputConnection").is_none());

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
