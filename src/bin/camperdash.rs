use camperdash::protocol::{CommandResponse, ProtocolHandler, ResponseStatus, ServerMessage, TelemetryFrame};
use camperdash::settings::{SettingsStore, SECTIONS};
use camperdash::{CommandType, Doors, Lights, VehicleState};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_SETTINGS: &str = "camper_settings.json";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("camperdash")
        .version("0.1.0")
        .about("🚐 Camper dashboard client - drive and inspect the vehicle simulator")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("settings")
                .short("s")
                .long("settings")
                .value_name("FILE")
                .help("Dashboard settings file")
                .takes_value(true)
                .default_value(DEFAULT_SETTINGS)
                .global(true),
        )
        .subcommand(SubCommand::with_name("ping").about("Check that the simulator answers"))
        .subcommand(SubCommand::with_name("status").about("Show the current vehicle state"))
        .subcommand(
            SubCommand::with_name("engine")
                .about("Start, stop or toggle the engine")
                .arg(
                    Arg::with_name("action")
                        .help("Engine action")
                        .required(true)
                        .possible_values(&["start", "stop", "toggle"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("light")
                .about("Toggle a light")
                .arg(Arg::with_name("id").help("Light id").required(true).possible_values(&Lights::IDS)),
        )
        .subcommand(
            SubCommand::with_name("door")
                .about("Toggle a door")
                .arg(Arg::with_name("id").help("Door id").required(true).possible_values(&Doors::IDS)),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("Stream live telemetry")
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("N")
                        .help("Stop after N frames")
                        .takes_value(true)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(n) if n > 0 => Ok(()),
                            _ => Err("Count must be a positive number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("settings")
                .about("Manage dashboard preferences")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("show")
                        .about("Print all settings or one section")
                        .arg(Arg::with_name("section").help("Section name").possible_values(&SECTIONS)),
                )
                .subcommand(
                    SubCommand::with_name("set")
                        .about("Set one key of a section")
                        .arg(Arg::with_name("section").required(true).possible_values(&SECTIONS))
                        .arg(Arg::with_name("key").required(true))
                        .arg(Arg::with_name("value").help("JSON value, e.g. 70 or '\"imperial\"'").required(true)),
                )
                .subcommand(
                    SubCommand::with_name("reset")
                        .about("Restore defaults for one section or everything")
                        .arg(Arg::with_name("section").possible_values(&SECTIONS)),
                )
                .subcommand(SubCommand::with_name("export").about("Print settings as JSON"))
                .subcommand(
                    SubCommand::with_name("import")
                        .about("Load settings from a JSON file")
                        .arg(Arg::with_name("file").required(true)),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");
    let settings_path = matches.value_of("settings").unwrap_or(DEFAULT_SETTINGS);

    match matches.subcommand() {
        ("ping", _) => handle_ping(host, port, format).await?,
        ("status", _) => handle_status(host, port, format, settings_path).await?,
        ("engine", Some(sub_matches)) => handle_engine(sub_matches, host, port, format, settings_path).await?,
        ("light", Some(sub_matches)) => {
            let light = sub_matches.value_of("id").unwrap_or_default().to_string();
            let response = send_command(host, port, CommandType::ToggleLight { light: light.clone() }).await?;
            print_toggle_result("Light", &light, &response, format)?;
        }
        ("door", Some(sub_matches)) => {
            let door = sub_matches.value_of("id").unwrap_or_default().to_string();
            let response = send_command(host, port, CommandType::ToggleDoor { door: door.clone() }).await?;
            print_toggle_result("Door", &door, &response, format)?;
        }
        ("monitor", Some(sub_matches)) => handle_monitor(sub_matches, host, port, format, settings_path).await?,
        ("settings", Some(sub_matches)) => handle_settings(sub_matches, settings_path)?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

async fn handle_ping(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let started = std::time::Instant::now();
    let response = send_command(host, port, CommandType::Ping).await?;
    let elapsed = started.elapsed();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&response)?),
        "compact" => println!("pong {}ms", elapsed.as_millis()),
        _ => {
            let engine = if response.running { "running".bright_green() } else { "off".dimmed() };
            println!(
                "{} Simulator at {}:{} answered in {}ms (engine {})",
                "✅".green(),
                host,
                port,
                elapsed.as_millis().to_string().bright_cyan(),
                engine
            );
        }
    }
    Ok(())
}

async fn handle_status(host: &str, port: u16, format: &str, settings_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = send_command(host, port, CommandType::GetState).await?;
    let Some(state) = response.state.as_ref() else {
        return Err("Simulator returned no state".into());
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(state)?),
        "compact" => println!("{}", compact_line(state, &load_display_settings(settings_path))),
        _ => print_state_table(state, &load_display_settings(settings_path)),
    }
    Ok(())
}

async fn handle_engine(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
    settings_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let command_type = match matches.value_of("action") {
        Some("start") => CommandType::Start,
        Some("stop") => CommandType::Stop,
        _ => CommandType::ToggleEngine,
    };
    let response = send_command(host, port, command_type).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&response)?),
        "compact" => println!("{}", if response.running { "running" } else { "stopped" }),
        _ => {
            if response.running {
                println!("{} Engine {}", "🔑".green(), "running".bright_green().bold());
            } else {
                println!("{} Engine {}", "🔑".yellow(), "stopped".bright_yellow().bold());
            }
            if let Some(state) = &response.state {
                print_state_table(state, &load_display_settings(settings_path));
            }
        }
    }
    Ok(())
}

async fn handle_monitor(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
    settings_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let limit = matches.value_of("count").map(str::parse::<u64>).transpose()?;
    let settings = load_display_settings(settings_path);

    let stream = connect(host, port).await?;
    let mut lines = BufReader::new(stream).lines();

    if format == "table" {
        println!("{}", "📡 Monitoring camper telemetry (Press Ctrl+C to stop)...".bright_blue().bold());
        println!(
            "{}",
            format!(
                "{:>8} │ {:>10} │ {:>6} │ {:>4} │ {:>8} │ {:>6} │ {:>10} │ {}",
                "Seq",
                format!("Speed {}", settings.speed_unit()),
                "RPM",
                "Gear",
                format!("Eng {}", settings.temperature_unit()),
                "Fuel",
                "Odometer",
                "Warnings"
            )
            .bright_white()
        );
    }

    let mut received = 0u64;
    while let Some(line) = lines.next_line().await? {
        let Ok(ServerMessage::Telemetry(frame)) = serde_json::from_str::<ServerMessage>(&line) else {
            continue;
        };

        match format {
            "json" => println!("{}", line),
            "compact" => println!("#{} {}", frame.sequence_number, compact_line(&frame.state, &settings)),
            _ => print_telemetry_row(&frame, &settings),
        }

        received += 1;
        if limit.is_some_and(|limit| received >= limit) {
            break;
        }
    }

    Ok(())
}

fn handle_settings(matches: &ArgMatches<'_>, settings_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SettingsStore::open(settings_path)?;

    match matches.subcommand() {
        ("show", Some(sub_matches)) => {
            let value = match sub_matches.value_of("section") {
                Some(section) => store.section(section).cloned().unwrap_or_default(),
                None => store.all().clone(),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ("set", Some(sub_matches)) => {
            let section = sub_matches.value_of("section").unwrap_or_default();
            let key = sub_matches.value_of("key").unwrap_or_default();
            let raw = sub_matches.value_of("value").unwrap_or_default();
            // Bare words are taken as strings so `set interface units imperial` works
            let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            store.update(section, key, value.clone())?;
            println!("{} {}.{} = {}", "✅".green(), section.bright_white(), key.bright_white(), value.to_string().bright_cyan());
        }
        ("reset", Some(sub_matches)) => {
            let section = sub_matches.value_of("section");
            store.reset(section)?;
            println!("{} Reset {}", "✅".green(), section.unwrap_or("all sections").bright_white());
        }
        ("export", _) => println!("{}", store.export()?),
        ("import", Some(sub_matches)) => {
            let file = sub_matches.value_of("file").unwrap_or_default();
            let contents = std::fs::read_to_string(file)?;
            store.import(&contents)?;
            println!("{} Imported settings from {}", "✅".green(), file.bright_white());
        }
        _ => println!("{}", "No settings command specified. Use --help for usage information.".yellow()),
    }

    Ok(())
}

// Networking

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to camper simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin camperdash-simulator".bright_cyan());
            }
            Err(e.into())
        }
    }
}

/// Sends one command and waits for the response carrying its id. Telemetry
/// frames that arrive in between are skipped.
async fn send_command(host: &str, port: u16, command_type: CommandType) -> Result<CommandResponse, Box<dyn std::error::Error>> {
    let stream = connect(host, port).await?;
    let mut handler = ProtocolHandler::new();
    let command = handler.create_command(command_type);

    match tokio::time::timeout(COMMAND_TIMEOUT, exchange(stream, &command)).await {
        Ok(result) => result,
        Err(_) => {
            eprintln!("{} Command timed out after {} seconds", "⏰".yellow(), COMMAND_TIMEOUT.as_secs());
            Err("Command timeout".into())
        }
    }
}

async fn exchange(stream: TcpStream, command: &camperdash::Command) -> Result<CommandResponse, Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();

    let mut json = serde_json::to_string(command)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str::<ServerMessage>(&line) {
            Ok(ServerMessage::Response(response)) if response.id == command.id || response.id == 0 => {
                return match response.status {
                    ResponseStatus::Success | ResponseStatus::Ignored => Ok(response),
                    status => Err(format!(
                        "{:?}: {}",
                        status,
                        response.message.as_deref().unwrap_or("command rejected")
                    )
                    .into()),
                };
            }
            _ => continue,
        }
    }

    Err("Server closed connection".into())
}

// Output helpers

/// Settings used only for display; a missing file means defaults and is
/// not created.
fn load_display_settings(path: &str) -> SettingsStore {
    if !Path::new(path).exists() {
        return SettingsStore::in_memory();
    }
    SettingsStore::open(path).unwrap_or_else(|e| {
        eprintln!("{} Ignoring settings file {}: {}", "⚠️".yellow(), path, e);
        SettingsStore::in_memory()
    })
}

fn print_toggle_result(kind: &str, id: &str, response: &CommandResponse, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(response)?),
        "compact" => println!("{:?}", response.status),
        _ => {
            if response.status == ResponseStatus::Ignored {
                let message = response.message.as_deref().unwrap_or("Unknown id");
                println!("{} {}", "⚠️".yellow(), message.bright_yellow());
                return Ok(());
            }

            let on = response.state.as_ref().and_then(|state| match kind {
                "Light" => light_value(&state.lights, id),
                _ => door_value(&state.doors, id),
            });
            let label = match (kind, on) {
                ("Light", Some(true)) => "on".bright_green(),
                ("Light", Some(false)) => "off".dimmed(),
                (_, Some(true)) => "open".bright_yellow(),
                (_, Some(false)) => "closed".bright_green(),
                (_, None) => "toggled".normal(),
            };
            println!("{} {} {} is now {}", "✅".green(), kind, id.bright_white(), label);
        }
    }
    Ok(())
}

fn light_value(lights: &Lights, id: &str) -> Option<bool> {
    match id {
        "headlights" => Some(lights.headlights),
        "position" => Some(lights.position),
        "interior" => Some(lights.interior),
        "awning" => Some(lights.awning),
        _ => None,
    }
}

fn door_value(doors: &Doors, id: &str) -> Option<bool> {
    match id {
        "driver" => Some(doors.driver),
        "passenger" => Some(doors.passenger),
        "sliding" => Some(doors.sliding),
        "rear" => Some(doors.rear),
        _ => None,
    }
}

fn warnings_label(state: &VehicleState) -> String {
    let active: Vec<&str> = state.warnings.active().map(|kind| kind.as_str()).collect();
    if active.is_empty() {
        "-".to_string()
    } else {
        active.join(",")
    }
}

fn compact_line(state: &VehicleState, settings: &SettingsStore) -> String {
    format!(
        "{:.0}{} {:.0}rpm g{} {:.1}{} fuel {:.1}% {:.1}km [{}]",
        settings.convert_speed(state.speed),
        settings.speed_unit(),
        state.rpm,
        state.gear,
        settings.convert_temperature(state.engine_temp),
        settings.temperature_unit(),
        state.fuel_level,
        state.total_km,
        warnings_label(state)
    )
}

fn print_telemetry_row(frame: &TelemetryFrame, settings: &SettingsStore) {
    let state = &frame.state;
    let engine_temp = settings.convert_temperature(state.engine_temp);
    let temp_str = format!("{:>10.1}", engine_temp);
    let temp_str = if state.warnings.engine_temp { temp_str.red() } else { temp_str.white() };
    let fuel_str = format!("{:>5.1}%", state.fuel_level);
    let fuel_str = if state.warnings.fuel_low { fuel_str.yellow() } else { fuel_str.green() };
    let warnings = warnings_label(state);
    let warnings = if warnings == "-" { warnings.dimmed() } else { warnings.bright_red() };

    println!(
        "{:>8} │ {:>10.0} │ {:>6.0} │ {:>4} │ {} │ {} │ {:>10.1} │ {}",
        frame.sequence_number,
        settings.convert_speed(state.speed),
        state.rpm,
        state.gear.as_str(),
        temp_str,
        fuel_str,
        state.total_km,
        warnings
    );
}

fn print_state_table(state: &VehicleState, settings: &SettingsStore) {
    let on_off = |on: bool| if on { "ON".bright_green() } else { "off".dimmed() };
    let open_closed = |open: bool| if open { "OPEN".bright_yellow() } else { "closed".green() };

    println!("{}", "🚐 Camper Status".bright_blue().bold());
    println!("{}", "═".repeat(40).bright_white());

    let engine = if state.engine_running { "RUNNING".bright_green().bold() } else { "OFF".yellow() };
    println!("  Engine:        {}", engine);
    println!("  Speed:         {:.0} {}", settings.convert_speed(state.speed), settings.speed_unit());
    println!("  RPM:           {:.0}", state.rpm);
    println!("  Gear:          {}", state.gear.as_str().bright_cyan());
    println!(
        "  Engine temp:   {:.1} {}",
        settings.convert_temperature(state.engine_temp),
        settings.temperature_unit()
    );
    println!(
        "  Inside/Out:    {:.1} / {:.1} {}",
        settings.convert_temperature(state.temperature_inside),
        settings.convert_temperature(state.temperature_outside),
        settings.temperature_unit()
    );
    println!("  Odometer:      {:.1} km (trip {:.1} km)", state.total_km, state.trip_km);
    println!("  Trip fuel:     {}", settings.format_fuel_cost(state.trip_km));

    println!("\n{}", "Tanks".bright_white().bold());
    println!("  Fuel:          {:.1}%", state.fuel_level);
    println!("  Fresh water:   {:.1}%", state.water_tank);
    println!("  Grey water:    {:.1}%", state.grey_water);
    println!("  Black water:   {:.1}%", state.black_water);

    println!("\n{}", "Batteries".bright_white().bold());
    println!("  Main:          {:.2} V", state.battery_main);
    println!("  Service:       {:.2} V", state.battery_service);

    println!("\n{}", "Lights".bright_white().bold());
    for id in Lights::IDS {
        println!("  {:<14} {}", format!("{}:", id), on_off(light_value(&state.lights, id).unwrap_or(false)));
    }

    println!("\n{}", "Doors".bright_white().bold());
    for id in Doors::IDS {
        println!("  {:<14} {}", format!("{}:", id), open_closed(door_value(&state.doors, id).unwrap_or(false)));
    }

    println!("\n{}", "Warnings".bright_white().bold());
    let active: Vec<_> = state.warnings.active().collect();
    if active.is_empty() {
        println!("  {}", "none".green());
    }
    for kind in active {
        println!("  {} {}", "⚠️".red(), kind.as_str().bright_red());
    }
}
