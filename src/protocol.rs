use crate::simulator::VehicleSimulator;
use crate::state::VehicleState;
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const MAX_COMMAND_SIZE: usize = 512;

pub type CommandBuffer = ArrayString<MAX_COMMAND_SIZE>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub timestamp: u64,
    pub command_type: CommandType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    Ping,
    GetState,
    IsRunning,
    Start,
    Stop,
    ToggleEngine,
    ToggleLight { light: String },
    ToggleDoor { door: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u32,
    pub timestamp: u64,
    pub status: ResponseStatus,
    pub running: bool,
    pub message: Option<String>,
    pub state: Option<VehicleState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    /// Accepted but had no effect (unknown light or door id).
    Ignored,
    InvalidCommand,
    ParseError,
}

/// One published snapshot as streamed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub sequence_number: u64,
    pub timestamp: u64,
    pub state: VehicleState,
}

impl TelemetryFrame {
    pub fn new(sequence_number: u64, state: VehicleState) -> Self {
        Self {
            sequence_number,
            timestamp: unix_millis(),
            state,
        }
    }
}

/// Everything the server writes to a client, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Telemetry(TelemetryFrame),
    Response(CommandResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProtocolStats {
    pub commands_executed: u32,
    pub commands_ignored: u32,
    pub commands_rejected: u32,
    pub parse_errors: u32,
}

#[derive(Debug)]
pub struct ProtocolHandler {
    command_counter: u32,
    command_buffer: CommandBuffer,
    stats: ProtocolStats,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            command_counter: 0,
            command_buffer: ArrayString::new(),
            stats: ProtocolStats::default(),
        }
    }

    pub fn parse_command(&mut self, json_str: &str) -> Result<Command, ProtocolError> {
        self.command_buffer.clear();

        if self.command_buffer.try_push_str(json_str).is_err() {
            return Err(ProtocolError::MessageTooLarge);
        }

        Ok(serde_json::from_str::<Command>(&self.command_buffer)?)
    }

    pub fn validate_command(&self, command: &Command) -> Result<(), ProtocolError> {
        if command.id == 0 {
            return Err(ProtocolError::InvalidCommand);
        }

        match &command.command_type {
            CommandType::ToggleLight { light: id } | CommandType::ToggleDoor { door: id } => {
                if id.trim().is_empty() {
                    return Err(ProtocolError::InvalidParameter);
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Runs a command against the simulator and builds its response.
    pub fn execute(&mut self, simulator: &mut VehicleSimulator, command: Command) -> CommandResponse {
        if let Err(e) = self.validate_command(&command) {
            self.stats.commands_rejected += 1;
            return self.create_response(
                command.id,
                ResponseStatus::InvalidCommand,
                simulator.is_running(),
                Some(&format!("Command validation failed: {}", e)),
                None,
            );
        }

        let (status, message) = match &command.command_type {
            CommandType::Ping => (ResponseStatus::Success, Some("pong".to_string())),
            CommandType::GetState | CommandType::IsRunning => (ResponseStatus::Success, None),
            CommandType::Start => {
                simulator.start();
                (ResponseStatus::Success, None)
            }
            CommandType::Stop => {
                simulator.stop();
                (ResponseStatus::Success, None)
            }
            CommandType::ToggleEngine => {
                simulator.toggle_engine();
                (ResponseStatus::Success, None)
            }
            CommandType::ToggleLight { light } => {
                if simulator.toggle_light(light) {
                    (ResponseStatus::Success, None)
                } else {
                    (ResponseStatus::Ignored, Some(format!("Unknown light '{}'", light)))
                }
            }
            CommandType::ToggleDoor { door } => {
                if simulator.toggle_door(door) {
                    (ResponseStatus::Success, None)
                } else {
                    (ResponseStatus::Ignored, Some(format!("Unknown door '{}'", door)))
                }
            }
        };

        match status {
            ResponseStatus::Ignored => self.stats.commands_ignored += 1,
            _ => self.stats.commands_executed += 1,
        }

        let state = match command.command_type {
            CommandType::Ping | CommandType::IsRunning => None,
            _ => Some(simulator.get_state()),
        };

        self.create_response(command.id, status, simulator.is_running(), message.as_deref(), state)
    }

    /// Parses and executes one request line. Parse failures become a
    /// `ParseError` response with id 0.
    pub fn handle_line(&mut self, simulator: &mut VehicleSimulator, line: &str) -> CommandResponse {
        match self.parse_command(line) {
            Ok(command) => self.execute(simulator, command),
            Err(e) => {
                self.stats.parse_errors += 1;
                self.create_response(
                    0,
                    ResponseStatus::ParseError,
                    simulator.is_running(),
                    Some(&format!("Invalid command format: {}", e)),
                    None,
                )
            }
        }
    }

    pub fn serialize_message(&self, message: &ServerMessage) -> Result<String, ProtocolError> {
        serde_json::to_string(message).map_err(|_| ProtocolError::SerializationError)
    }

    pub fn create_response(
        &self,
        command_id: u32,
        status: ResponseStatus,
        running: bool,
        message: Option<&str>,
        state: Option<VehicleState>,
    ) -> CommandResponse {
        CommandResponse {
            id: command_id,
            timestamp: unix_millis(),
            status,
            running,
            message: message.map(ToString::to_string),
            state,
        }
    }

    /// Builds a command with the next id from this handler's counter.
    pub fn create_command(&mut self, command_type: CommandType) -> Command {
        Command {
            id: self.next_command_id(),
            timestamp: unix_millis(),
            command_type,
        }
    }

    pub fn next_command_id(&mut self) -> u32 {
        self.command_counter = self.command_counter.wrapping_add(1).max(1);
        self.command_counter
    }

    pub fn get_stats(&self) -> &ProtocolStats {
        &self.stats
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Message exceeds command buffer size")]
    MessageTooLarge,

    #[error("Serialization failed")]
    SerializationError,

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Invalid parameter")]
    InvalidParameter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_never_zero() {
        let mut handler = ProtocolHandler::new();
        handler.command_counter = u32::MAX;
        assert_eq!(handler.next_command_id(), 1);
    }

    #[test]
    fn test_oversized_command_rejected() {
        let mut handler = ProtocolHandler::new();
        let line = format!(
            r#"{{"id":1,"timestamp":0,"command_type":{{"ToggleLight":{{"light":"{}"}}}}}}"#,
            "x".repeat(MAX_COMMAND_SIZE)
        );
        assert!(matches!(handler.parse_command(&line), Err(ProtocolError::MessageTooLarge)));
    }

    #[test]
    fn test_server_message_tagging() {
        let frame = TelemetryFrame::new(7, VehicleState::new());
        let json = serde_json::to_value(ServerMessage::Telemetry(frame)).unwrap();
        assert_eq!(json["kind"], "telemetry");
        assert_eq!(json["sequence_number"], 7);
        assert_eq!(json["state"]["gear"], "N");
    }
}
