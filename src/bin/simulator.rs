use camperdash::server::{accept_clients, attach_telemetry, SharedSimulator};
use camperdash::{SimulatorConfig, VehicleSimulator};
use clap::{App, Arg};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = App::new("camperdash-simulator")
        .version("0.1.0")
        .about("Simulated camper telemetry source for the dashboards")
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Address to listen on")
                .takes_value(true)
                .default_value(DEFAULT_HOST),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port to listen on")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON file with simulator tuning")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Fixed seed for reproducible runs")
                .takes_value(true)
                .validator(|v| v.parse::<u64>().map(|_| ()).map_err(|_| "Seed must be a number".to_string())),
        )
        .arg(
            Arg::with_name("autostart")
                .long("autostart")
                .help("Start the engine as soon as the server is up"),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => SimulatorConfig::from_file(path)?,
        None => SimulatorConfig::new(),
    };
    if let Some(seed) = matches.value_of("seed") {
        config.seed = Some(seed.parse()?);
    }

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let frame_period = Duration::from_millis(config.frame_period_ms);

    let mut simulator = VehicleSimulator::new(config)?;
    let (_, telemetry_rx) = attach_telemetry(&mut simulator);

    if matches.is_present("autostart") {
        simulator.start();
    }

    let simulator: SharedSimulator = Arc::new(Mutex::new(simulator));

    let listener = TcpListener::bind(format!("{}:{}", host, port)).await?;
    info!("Telemetry server listening on {}:{}", host, port);

    let tcp_simulator = Arc::clone(&simulator);
    let tcp_server = tokio::spawn(async move {
        accept_clients(listener, tcp_simulator, telemetry_rx).await;
    });

    let mut interval = time::interval(frame_period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                simulator.lock().await.update();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    tcp_server.abort();
    simulator.lock().await.stop();
    info!("Simulator stopped");

    Ok(())
}
