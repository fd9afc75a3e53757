//! Closed-form pieces of the animation processes.
//!
//! Everything here is a pure function of its inputs; the simulator supplies
//! clock readings and random draws.

use crate::config::{BatteryConfig, RpmConfig, SpeedConfig, TemperatureConfig};

/// Phase of the speed cycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedPhase {
    Accelerating,
    Decelerating,
    Paused,
}

pub fn speed_phase(elapsed_ms: u64, config: &SpeedConfig) -> SpeedPhase {
    let t = elapsed_ms % config.cycle_ms();
    if t < config.acceleration_ms {
        SpeedPhase::Accelerating
    } else if t < config.acceleration_ms + config.deceleration_ms {
        SpeedPhase::Decelerating
    } else {
        SpeedPhase::Paused
    }
}

/// Road speed `elapsed_ms` after the cycle was anchored, rounded to whole
/// km/h.
pub fn speed_at(elapsed_ms: u64, config: &SpeedConfig) -> f64 {
    let t = elapsed_ms % config.cycle_ms();

    match speed_phase(elapsed_ms, config) {
        SpeedPhase::Accelerating => {
            let progress = t as f64 / config.acceleration_ms as f64;
            (progress * config.max_speed).round()
        }
        SpeedPhase::Decelerating => {
            let progress = (t - config.acceleration_ms) as f64 / config.deceleration_ms as f64;
            (config.max_speed * (1.0 - progress)).round()
        }
        SpeedPhase::Paused => 0.0,
    }
}

/// Engine speed for a road speed, with `jitter` already drawn by the caller.
pub fn rpm_for_speed(speed: f64, jitter: f64, max_speed: f64, config: &RpmConfig) -> f64 {
    if speed == 0.0 {
        return config.idle;
    }
    let base = (speed / max_speed) * config.max;
    (base + jitter).clamp(config.idle, config.max)
}

/// Moves `current` the given fraction of the way to `target`.
pub fn approach(current: f64, target: f64, fraction: f64) -> f64 {
    current + (target - current) * fraction
}

pub fn engine_temp_target(speed: f64, max_speed: f64, config: &TemperatureConfig) -> f64 {
    config.min + (speed / max_speed) * (config.max - config.min)
}

pub fn cool_down(engine_temp: f64, config: &TemperatureConfig) -> f64 {
    (engine_temp - config.cooldown_step).max(config.ambient)
}

pub fn battery_target(engine_running: bool, config: &BatteryConfig) -> f64 {
    if engine_running {
        config.running_voltage
    } else {
        config.off_voltage
    }
}

/// One smoothing step of the main battery, kept inside its voltage window.
pub fn battery_step(current: f64, engine_running: bool, config: &BatteryConfig) -> f64 {
    approach(current, battery_target(engine_running, config), config.smoothing)
        .clamp(config.min, config.max)
}
