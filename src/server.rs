//! TCP front end: streams telemetry frames and executes client commands.
//!
//! Every connection receives line-delimited [`ServerMessage`]s. Telemetry is
//! fanned out through a `watch` channel that only holds the newest frame, so
//! a slow client skips frames instead of queueing them.

use crate::protocol::{ProtocolHandler, ResponseStatus, ServerMessage, TelemetryFrame, MAX_COMMAND_SIZE};
use crate::simulator::VehicleSimulator;
use crate::subscribers::{SubscriberError, SubscriptionId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

pub type SharedSimulator = Arc<Mutex<VehicleSimulator>>;
type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;
type ClientResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Subscribes a telemetry publisher to `simulator` and returns the receiving
/// side. Frames are numbered from 1 in publish order.
pub fn attach_telemetry(simulator: &mut VehicleSimulator) -> (SubscriptionId, watch::Receiver<TelemetryFrame>) {
    let (telemetry_tx, telemetry_rx) = watch::channel(TelemetryFrame::new(0, simulator.get_state()));

    let mut sequence_number = 0u64;
    let id = simulator.subscribe(move |state| {
        sequence_number += 1;
        telemetry_tx.send_replace(TelemetryFrame::new(sequence_number, state.clone()));
        if telemetry_tx.is_closed() {
            return Err(SubscriberError::Closed);
        }
        Ok(())
    });

    (id, telemetry_rx)
}

/// Accepts connections forever, one task per client.
pub async fn accept_clients(listener: TcpListener, simulator: SharedSimulator, telemetry_rx: watch::Receiver<TelemetryFrame>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Client connected: {}", addr);
                let client_simulator = Arc::clone(&simulator);
                let client_telemetry_rx = telemetry_rx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_simulator, client_telemetry_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

pub async fn handle_client(
    stream: TcpStream,
    simulator: SharedSimulator,
    mut telemetry_rx: watch::Receiver<TelemetryFrame>,
) -> ClientResult {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer: SharedWriter = Arc::new(Mutex::new(writer));

    // The frame current at connect time goes out first
    telemetry_rx.mark_changed();

    let telemetry_writer = Arc::clone(&writer);
    let telemetry_task = tokio::spawn(async move {
        while telemetry_rx.changed().await.is_ok() {
            let message = ServerMessage::Telemetry(telemetry_rx.borrow_and_update().clone());
            if let Err(e) = write_message(&telemetry_writer, &message).await {
                warn!("Failed to send telemetry: {}", e);
                break;
            }
        }
    });

    let mut handler = ProtocolHandler::new();
    let mut line = String::new();
    loop {
        line.clear();
        // One byte past the limit is enough to tell an oversized line apart
        let mut limited = (&mut buf_reader).take(MAX_COMMAND_SIZE as u64 + 1);
        match limited.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) if !line.ends_with('\n') && line.len() > MAX_COMMAND_SIZE => {
                warn!("Dropping client after oversized command line");
                let response = {
                    let sim = simulator.lock().await;
                    handler.create_response(
                        0,
                        ResponseStatus::ParseError,
                        sim.is_running(),
                        Some("Message exceeds command buffer size"),
                        None,
                    )
                };
                let result = write_message(&writer, &ServerMessage::Response(response)).await;
                telemetry_task.abort();
                return result;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = {
                    let mut sim = simulator.lock().await;
                    handler.handle_line(&mut sim, trimmed)
                };
                debug!("Command {} -> {:?}", response.id, response.status);

                if let Err(e) = write_message(&writer, &ServerMessage::Response(response)).await {
                    telemetry_task.abort();
                    return Err(e);
                }
            }
            Err(e) => {
                error!("Error reading from client: {}", e);
                break;
            }
        }
    }

    telemetry_task.abort();
    Ok(())
}

async fn write_message(writer: &SharedWriter, message: &ServerMessage) -> ClientResult {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');

    let mut writer_guard = writer.lock().await;
    writer_guard.write_all(json.as_bytes()).await?;
    Ok(())
}
