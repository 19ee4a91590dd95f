//! Command-line interface and REPL
//!
//! Lines are read on a dedicated thread (rustyline blocks) and executed on
//! the runtime, one at a time. Controller notifications are printed as
//! they arrive.

use anyhow::{anyhow, bail, Result};
use colored::*;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::bus::{ContextId, Subscription};
use crate::controller::SessionController;
use crate::engine::QueuedPicker;
use crate::playback::Playback;
use crate::protocol::{MidiChannel, MidiMessage};
use crate::recorder::Recorder;
use crate::session::{PortDirection, Session};

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Scan,
    Ports,
    Connect(PortDirection, String),
    Disconnect(PortDirection),
    Send(MidiMessage),
    Record(RecordAction),
    Save(u32),
    Delete(u32),
    Load(PathBuf),
    Eject(u32),
    PlayRecording(u32),
    PlayTrack(u32),
    Pause,
    Resume,
    Stop,
    Status,
    Monitor(bool),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Start,
    Stop,
    Pause,
    Resume,
}

fn index(arg: Option<&str>) -> Result<u32> {
    let arg = arg.ok_or_else(|| anyhow!("missing index"))?;
    arg.parse()
        .map_err(|_| anyhow!("'{}' is not a valid index", arg))
}

fn byte(arg: Option<&str>, what: &str) -> Result<u8> {
    let arg = arg.ok_or_else(|| anyhow!("missing {}", what))?;
    arg.parse()
        .map_err(|_| anyhow!("'{}' is not a valid {}", arg, what))
}

/// Parse one REPL line; `Ok(None)` for a blank line
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let mut args = rest.split_whitespace();

    let command = match word {
        "" => return Ok(None),
        "help" | "?" => Command::Help,
        "scan" => Command::Scan,
        "ports" => Command::Ports,
        "in" | "out" => {
            if rest.is_empty() {
                bail!("usage: {} <port id>", word);
            }
            let direction = if word == "in" {
                PortDirection::Input
            } else {
                PortDirection::Output
            };
            Command::Connect(direction, rest.to_string())
        }
        "in-off" => Command::Disconnect(PortDirection::Input),
        "out-off" => Command::Disconnect(PortDirection::Output),
        "send" => Command::Send(MidiMessage::from_json(rest)?),
        "note" => {
            let number = byte(args.next(), "channel")?;
            let channel = MidiChannel::from_number(number)
                .ok_or_else(|| anyhow!("channel must be 1-16, got {}", number))?;
            let note = byte(args.next(), "note")?;
            let velocity = byte(args.next(), "velocity")?;
            Command::Send(MidiMessage::note_on(channel, note, velocity)?)
        }
        "rec" => Command::Record(match args.next() {
            Some("start") => RecordAction::Start,
            Some("stop") => RecordAction::Stop,
            Some("pause") => RecordAction::Pause,
            Some("resume") => RecordAction::Resume,
            _ => bail!("usage: rec start|stop|pause|resume"),
        }),
        "save" => Command::Save(index(args.next())?),
        "delete" => Command::Delete(index(args.next())?),
        "load" => {
            if rest.is_empty() {
                bail!("usage: load <path>");
            }
            Command::Load(PathBuf::from(rest))
        }
        "eject" => Command::Eject(index(args.next())?),
        "play" => match args.next() {
            Some("rec") => Command::PlayRecording(index(args.next())?),
            Some("track") => Command::PlayTrack(index(args.next())?),
            _ => bail!("usage: play rec <i> | play track <i>"),
        },
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "monitor" => match args.next() {
            Some("on") => Command::Monitor(true),
            Some("off") => Command::Monitor(false),
            _ => bail!("usage: monitor on|off"),
        },
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}', try 'help'", other),
    };
    Ok(Some(command))
}

const HELP: &str = "\
  scan                      enumerate input and output ports
  ports                     show ports and connections
  in <id> | out <id>        connect a port
  in-off | out-off          disconnect
  send <json>               send a message, e.g. {\"channel\":{...}}
  note <ch> <n> <vel>       send a note on
  rec start|stop|pause|resume
  save <i> | delete <i>     manage recordings
  load <path> | eject <i>   manage tracks
  play rec <i> | play track <i>
  pause | resume | stop     playback transport
  status                    recorder and playback state
  monitor on|off            print inbound traffic
  quit";

pub struct Repl {
    controller: SessionController,
    picker: Arc<QueuedPicker>,
    monitor_context: ContextId,
    monitor: Option<Subscription>,
}

impl Repl {
    pub fn new(controller: SessionController, picker: Arc<QueuedPicker>) -> Self {
        Self {
            controller,
            picker,
            monitor_context: ContextId::new(),
            monitor: None,
        }
    }

    /// Run until `quit` or end of input
    pub async fn run(mut self) -> Result<()> {
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let (ack_tx, ack_rx) = std_mpsc::channel::<bool>();
        let reader = std::thread::spawn(move || read_lines(line_tx, ack_rx));

        println!("{}", "=== midirc ===".bold().cyan());
        println!("{}", "Type 'help' for commands".dimmed());

        let mut notifications = self.controller.notifications();
        loop {
            tokio::select! {
                line = line_rx.recv() => {
                    let Some(line) = line else { break };
                    let keep_going = match parse(&line) {
                        Ok(Some(Command::Quit)) => false,
                        Ok(Some(command)) => {
                            if let Err(e) = self.execute(command).await {
                                println!("{} {}", "error:".red().bold(), e);
                            }
                            true
                        }
                        Ok(None) => true,
                        Err(e) => {
                            println!("{} {}", "error:".red().bold(), e);
                            true
                        }
                    };
                    if ack_tx.send(keep_going).is_err() || !keep_going {
                        break;
                    }
                }
                notification = notifications.recv() => match notification {
                    Ok(notification) => println!("{} {}", "!".yellow().bold(), notification),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        println!("{} {} notifications dropped", "!".yellow().bold(), missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
            }
        }

        drop(ack_tx);
        self.monitor.take();
        match reader.join() {
            Ok(result) => result,
            Err(_) => bail!("input thread panicked"),
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        let controller = &self.controller;
        match command {
            Command::Help => println!("{}", HELP),
            Command::Scan => print_session(&controller.scan().await?),
            Command::Ports => print_session(&controller.session()),
            Command::Connect(PortDirection::Input, id) => {
                print_session(&controller.connect_input(&id).await?)
            }
            Command::Connect(PortDirection::Output, id) => {
                print_session(&controller.connect_output(&id).await?)
            }
            Command::Disconnect(PortDirection::Input) => {
                print_session(&controller.disconnect_input().await?)
            }
            Command::Disconnect(PortDirection::Output) => {
                print_session(&controller.disconnect_output().await?)
            }
            Command::Send(message) => {
                controller.send_midi_message(message.clone()).await?;
                println!("{} {}", "sent".green(), message);
            }
            Command::Record(action) => {
                let recorder = match action {
                    RecordAction::Start => controller.start_recording().await?,
                    RecordAction::Stop => controller.stop_recording().await?,
                    RecordAction::Pause => controller.pause_recording().await?,
                    RecordAction::Resume => controller.resume_recording().await?,
                };
                print_recorder(&recorder);
            }
            Command::Save(i) => print_recorder(&controller.save_recording(i).await?),
            Command::Delete(i) => print_recorder(&controller.delete_recording(i).await?),
            Command::Load(path) => {
                self.picker.push(path);
                print_playback(&controller.load_track().await?);
            }
            Command::Eject(i) => print_playback(&controller.eject_track(i).await?),
            Command::PlayRecording(i) => print_playback(&controller.play_recording(i).await?),
            Command::PlayTrack(i) => print_playback(&controller.play_track(i).await?),
            Command::Pause => print_playback(&controller.pause_playback().await?),
            Command::Resume => print_playback(&controller.resume_playback().await?),
            Command::Stop => print_playback(&controller.stop_playback().await?),
            Command::Status => {
                print_recorder(&controller.recorder());
                print_playback(&controller.update_playback().await?);
            }
            Command::Monitor(true) => {
                self.monitor = Some(controller.subscribe_midi(self.monitor_context, |message| {
                    println!("{} {}", "<<".blue(), message);
                }));
                println!("{}", "monitor on".green());
            }
            Command::Monitor(false) => {
                self.monitor.take();
                println!("{}", "monitor off".dimmed());
            }
            Command::Quit => {}
        }
        Ok(())
    }
}

fn read_lines(lines: mpsc::UnboundedSender<String>, ack: std_mpsc::Receiver<bool>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("midirc> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                if lines.send(line).is_err() {
                    break;
                }
                // Wait for the command to finish so output precedes the next prompt
                if !ack.recv().unwrap_or(false) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    Ok(())
}

fn print_ports(title: &str, session: &Session, direction: PortDirection) {
    println!("{}", title.bold());
    let connected = session.connection(direction);
    let ports = session.available(direction);
    if ports.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for port in ports {
        if connected.map(|c| c.id == port.id).unwrap_or(false) {
            println!("  {} {}", "*".green(), port.to_string().bright_white());
        } else {
            println!("    {}", port);
        }
    }
    if session.is_connection_stale(direction) {
        if let Some(port) = connected {
            println!("  {} {} (gone)", "*".red(), port);
        }
    }
}

fn print_session(session: &Session) {
    print_ports("Inputs:", session, PortDirection::Input);
    print_ports("Outputs:", session, PortDirection::Output);
}

fn print_recorder(recorder: &Recorder) {
    let state = if recorder.is_recording() {
        "recording".red().bold()
    } else if recorder.is_paused() {
        "paused".yellow()
    } else {
        "stopped".dimmed()
    };
    match recorder.elapsed() {
        Some(elapsed) => println!("Recorder: {} {:.1}s", state, elapsed.as_millis() as f64 / 1000.0),
        None => println!("Recorder: {}", state),
    }
    for recording in &recorder.recordings {
        let saved = recording
            .saved_as
            .as_ref()
            .map(|path| format!(" -> {}", path.display()))
            .unwrap_or_default();
        println!(
            "  #{} {}ms{}",
            recording.index,
            recording.duration_milliseconds,
            saved.dimmed()
        );
    }
}

fn print_playback(playback: &Playback) {
    let state = if playback.is_playing() {
        "playing".green().bold()
    } else if playback.is_paused() {
        "paused".yellow()
    } else {
        "stopped".dimmed()
    };
    match (playback.identifier(), playback.duration_milliseconds()) {
        (Some(identifier), Some(duration)) => println!(
            "Playback: {} {} {}/{}ms",
            state, identifier, playback.position_milliseconds, duration
        ),
        _ => println!("Playback: {}", state),
    }
    for track in &playback.tracks {
        println!(
            "  [{}] {} {}ms",
            track.index,
            track.title(),
            track.duration_milliseconds
        );
    }
}
