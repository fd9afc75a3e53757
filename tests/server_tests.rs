use camperdash::protocol::*;
use camperdash::server::{accept_clients, attach_telemetry, SharedSimulator};
use camperdash::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

async fn spawn_server() -> (SharedSimulator, ManualClock, std::net::SocketAddr) {
    let clock = ManualClock::new(0);
    let mut simulator = VehicleSimulator::with_clock(SimulatorConfig::new().with_seed(21), clock.clone()).unwrap();
    let (_, telemetry_rx) = attach_telemetry(&mut simulator);
    let simulator: SharedSimulator = Arc::new(Mutex::new(simulator));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(accept_clients(listener, Arc::clone(&simulator), telemetry_rx));

    (simulator, clock, addr)
}

async fn next_message(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> ServerMessage {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for server")
        .unwrap()
        .expect("server closed connection");
    serde_json::from_str(&line).unwrap()
}

async fn next_response(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> CommandResponse {
    loop {
        if let ServerMessage::Response(response) = next_message(lines).await {
            return response;
        }
    }
}

#[tokio::test]
async fn test_attach_telemetry_numbers_frames() {
    let mut simulator = VehicleSimulator::with_clock(SimulatorConfig::new(), ManualClock::new(0)).unwrap();
    let (_, mut telemetry_rx) = attach_telemetry(&mut simulator);

    assert_eq!(telemetry_rx.borrow().sequence_number, 0);

    simulator.toggle_light("interior");
    assert!(telemetry_rx.has_changed().unwrap());
    let frame = telemetry_rx.borrow_and_update().clone();
    assert_eq!(frame.sequence_number, 1);
    assert!(frame.state.lights.interior);

    // Only the newest frame is kept
    simulator.start();
    let frame = telemetry_rx.borrow_and_update().clone();
    assert_eq!(frame.sequence_number, 9);
    assert!(frame.state.engine_running);
}

#[tokio::test]
async fn test_telemetry_publisher_reports_closed_channel() {
    let mut simulator = VehicleSimulator::with_clock(SimulatorConfig::new(), ManualClock::new(0)).unwrap();
    let (_, telemetry_rx) = attach_telemetry(&mut simulator);
    drop(telemetry_rx);

    simulator.toggle_light("awning");
    assert_eq!(simulator.get_delivery_stats().failed, 1);
}

#[tokio::test]
async fn test_client_receives_initial_frame_and_command_responses() {
    let (simulator, _, addr) = spawn_server().await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    match next_message(&mut lines).await {
        ServerMessage::Telemetry(frame) => assert!(!frame.state.engine_running),
        ServerMessage::Response(_) => panic!("Expected telemetry first"),
    }

    writer
        .write_all(b"{\"id\":1,\"timestamp\":0,\"command_type\":{\"ToggleLight\":{\"light\":\"headlights\"}}}\n")
        .await
        .unwrap();
    let response = next_response(&mut lines).await;
    assert_eq!(response.id, 1);
    assert_eq!(response.status, ResponseStatus::Success);
    assert!(response.state.unwrap().lights.headlights);
    assert!(simulator.lock().await.get_state().lights.headlights);

    writer.write_all(b"garbage\n").await.unwrap();
    let response = next_response(&mut lines).await;
    assert_eq!(response.status, ResponseStatus::ParseError);

    writer
        .write_all(b"{\"id\":2,\"timestamp\":0,\"command_type\":\"Start\"}\n")
        .await
        .unwrap();
    let response = next_response(&mut lines).await;
    assert_eq!(response.id, 2);
    assert!(response.running);
}

#[tokio::test]
async fn test_simulation_ticks_reach_clients() {
    let (simulator, clock, addr) = spawn_server().await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, _writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    next_message(&mut lines).await;

    {
        let mut sim = simulator.lock().await;
        sim.start();
        clock.set(4_000);
        sim.update();
    }

    loop {
        if let ServerMessage::Telemetry(frame) = next_message(&mut lines).await {
            if frame.state.speed > 0.0 {
                assert!(frame.state.engine_running);
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_oversized_command_line_closes_connection() {
    let (_, _, addr) = spawn_server().await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    next_message(&mut lines).await;

    // One byte over the limit and no newline
    writer.write_all(&vec![b'x'; MAX_COMMAND_SIZE + 1]).await.unwrap();

    let response = next_response(&mut lines).await;
    assert_eq!(response.id, 0);
    assert_eq!(response.status, ResponseStatus::ParseError);
    assert_eq!(response.message.as_deref(), Some("Message exceeds command buffer size"));

    loop {
        let read = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("connection was not closed");
        match read {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
}

#[tokio::test]
async fn test_command_at_size_limit_is_accepted() {
    let (_, _, addr) = spawn_server().await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    next_message(&mut lines).await;

    let mut command = String::from(r#"{"id":3,"timestamp":0,"command_type":"Ping"}"#);
    while command.len() < MAX_COMMAND_SIZE {
        command.insert(1, ' ');
    }
    command.push('\n');
    writer.write_all(command.as_bytes()).await.unwrap();

    let response = next_response(&mut lines).await;
    assert_eq!(response.id, 3);
    assert_eq!(response.status, ResponseStatus::Success);
}
