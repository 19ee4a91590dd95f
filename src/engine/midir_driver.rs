//! `midir` backed port driver
//!
//! Port ids are midir's stable port identifiers, so a connect request keeps
//! working across rescans as long as the device stays plugged in.

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tracing::{debug, info};

use super::ports::{InputCallback, InputLink, OutputLink, PortDriver};
use crate::gateway::{GatewayError, GatewayResult};
use crate::protocol::format_hex;
use crate::session::{Port, PortDirection};

pub struct MidirDriver {
    client_name: String,
}

impl MidirDriver {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn midi_in(&self) -> GatewayResult<MidiInput> {
        MidiInput::new(&format!("{}-in", self.client_name))
            .map_err(|e| GatewayError::Enumeration(e.to_string()))
    }

    fn midi_out(&self) -> GatewayResult<MidiOutput> {
        MidiOutput::new(&format!("{}-out", self.client_name))
            .map_err(|e| GatewayError::Enumeration(e.to_string()))
    }
}

struct MidirInput {
    _connection: MidiInputConnection<()>,
}

impl InputLink for MidirInput {}

struct MidirOutput(MidiOutputConnection);

impl OutputLink for MidirOutput {
    fn send(&mut self, bytes: &[u8]) -> GatewayResult<()> {
        self.0.send(bytes).map_err(GatewayError::backend)?;
        debug!("Sent: {}", format_hex(bytes));
        Ok(())
    }
}

impl PortDriver for MidirDriver {
    fn name(&self) -> &str {
        "midir"
    }

    fn input_ports(&self) -> GatewayResult<Vec<Port>> {
        let midi_in = self.midi_in()?;
        let mut ports = Vec::new();
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                ports.push(Port::new(port.id(), name));
            }
        }
        debug!("Found {} MIDI input ports", ports.len());
        Ok(ports)
    }

    fn output_ports(&self) -> GatewayResult<Vec<Port>> {
        let midi_out = self.midi_out()?;
        let mut ports = Vec::new();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                ports.push(Port::new(port.id(), name));
            }
        }
        debug!("Found {} MIDI output ports", ports.len());
        Ok(ports)
    }

    fn open_input(&self, port: &Port, mut callback: InputCallback) -> GatewayResult<Box<dyn InputLink>> {
        let mut midi_in = self.midi_in()?;
        // Capture everything, sysex and clock included
        midi_in.ignore(Ignore::None);

        let midir_port = midi_in
            .find_port_by_id(port.id.clone())
            .ok_or_else(|| GatewayError::UnknownPort {
                direction: PortDirection::Input,
                id: port.id.clone(),
            })?;

        let connection = midi_in
            .connect(
                &midir_port,
                &self.client_name,
                move |_timestamp, data, _| callback(data),
                (),
            )
            .map_err(GatewayError::backend)?;

        info!("Connected to input port: {}", port.name);
        Ok(Box::new(MidirInput {
            _connection: connection,
        }))
    }

    fn open_output(&self, port: &Port) -> GatewayResult<Box<dyn OutputLink>> {
        let midi_out = self.midi_out()?;
        let midir_port = midi_out
            .find_port_by_id(port.id.clone())
            .ok_or_else(|| GatewayError::UnknownPort {
                direction: PortDirection::Output,
                id: port.id.clone(),
            })?;

        let connection = midi_out
            .connect(&midir_port, &self.client_name)
            .map_err(GatewayError::backend)?;

        info!("Connected to output port: {}", port.name);
        Ok(Box::new(MidirOutput(connection)))
    }
}
