//! # Camper Dashboard Simulator
//!
//! A self-contained vehicle telemetry source for the camper instrument
//! cluster and infotainment dashboards. It stands in for the vehicle
//! backend during demos and front-end development.
//!
//! ## Features
//!
//! - **Vehicle simulation**: speed/gear cycle, RPM, engine temperature,
//!   odometer, tanks, batteries and randomly pulsed warning lights
//! - **Publish/subscribe**: every state change is fanned out to subscribers,
//!   with failures isolated per subscriber
//! - **Deterministic time**: the simulator is driven by an explicit clock, so
//!   runs can be replayed exactly with a manual clock and a fixed seed
//! - **TCP streaming**: line-delimited JSON telemetry and commands
//! - **Settings store**: dashboard preferences persisted as one JSON document
//!
//! ## Quick Start
//!
//! ```rust
//! use camperdash::{ManualClock, SimulatorConfig, VehicleSimulator};
//!
//! let clock = ManualClock::new(0);
//! let mut simulator = VehicleSimulator::with_clock(SimulatorConfig::new(), clock.clone()).unwrap();
//!
//! simulator.subscribe(|state| {
//!     println!("{} km/h in gear {}", state.speed, state.gear);
//!     Ok(())
//! });
//!
//! simulator.start();
//! clock.advance(4000);
//! simulator.update();
//! assert!(simulator.get_state().speed > 0.0);
//! ```
//!
//! ## Architecture
//!
//! - [`simulator`] - Vehicle simulator and public API
//! - [`animation`] - Closed-form maths of the animation processes
//! - [`scheduler`] - Time-ordered tick queue
//! - [`subscribers`] - Snapshot fan-out
//! - [`protocol`] - Command/response protocol
//! - [`server`] - TCP telemetry streaming and command handling
//! - [`settings`] - Persisted dashboard preferences

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod animation;
pub mod clock;
pub mod config;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod simulator;
pub mod state;
pub mod subscribers;

// Re-export main public types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::SimulatorConfig;
pub use protocol::{Command, CommandResponse, CommandType, ServerMessage, TelemetryFrame};
pub use simulator::VehicleSimulator;
pub use state::{Doors, Gear, Lights, VehicleState, WarningKind, Warnings};
pub use subscribers::{SubscriberError, SubscriptionId};
