use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// Host frame interval standing in for a display refresh
const FRAME_PERIOD_MS: u64 = 16;

/// Upper bound for every period and speed phase, one hour.
pub const MAX_PERIOD_MS: u64 = 3_600_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub acceleration_ms: u64,
    pub deceleration_ms: u64,
    pub pause_ms: u64,
    pub max_speed: f64,
}

impl SpeedConfig {
    pub fn cycle_ms(&self) -> u64 {
        self.acceleration_ms
            .saturating_add(self.deceleration_ms)
            .saturating_add(self.pause_ms)
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            acceleration_ms: 8000,
            deceleration_ms: 6000,
            pause_ms: 3000,
            max_speed: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpmConfig {
    pub period_ms: u64,
    pub idle: f64,
    pub max: f64,
    /// Half-width of the uniform noise added while moving.
    pub jitter: f64,
}

impl Default for RpmConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            idle: 800.0,
            max: 6500.0,
            jitter: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelConfig {
    /// Percent burned per speed tick while moving.
    pub consumption_per_tick: f64,
    pub low_threshold: f64,
}

impl Default for FuelConfig {
    fn default() -> Self {
        Self {
            consumption_per_tick: 0.001,
            low_threshold: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    pub min: f64,
    pub max: f64,
    pub ambient: f64,
    /// Fraction of the gap to target closed on each tick.
    pub smoothing: f64,
    pub cooldown_step: f64,
    pub warning_threshold: f64,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            min: 85.0,
            max: 105.0,
            ambient: 22.0,
            smoothing: 0.01,
            cooldown_step: 0.5,
            warning_threshold: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub period_ms: u64,
    pub min: f64,
    pub max: f64,
    pub running_voltage: f64,
    pub off_voltage: f64,
    pub smoothing: f64,
    pub low_threshold: f64,
    pub service_min: f64,
    pub service_max: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            period_ms: 500,
            min: 11.8,
            max: 14.2,
            running_voltage: 13.8,
            off_voltage: 12.4,
            smoothing: 0.01,
            low_threshold: 12.0,
            service_min: 13.0,
            service_max: 13.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometerConfig {
    pub period_ms: u64,
    pub increment_km: f64,
}

impl Default for OdometerConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            increment_km: 0.033,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    pub period_ms: u64,
    pub active_ms: u64,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            period_ms: 8000,
            active_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TanksConfig {
    pub period_ms: u64,
    pub water_consumption: f64,
    pub grey_water_fill: f64,
    pub black_water_fill: f64,
}

impl Default for TanksConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            water_consumption: 0.002,
            grey_water_fill: 0.001,
            black_water_fill: 0.0005,
        }
    }
}

/// Tuning for every animation process of the simulator.
///
/// All sections are optional in a config file; anything left out keeps its
/// default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Cadence of the per-frame processes (speed and engine temperature).
    pub frame_period_ms: u64,
    /// Fixed seed for the random source; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub speed: SpeedConfig,
    pub rpm: RpmConfig,
    pub fuel: FuelConfig,
    pub temperature: TemperatureConfig,
    pub battery: BatteryConfig,
    pub odometer: OdometerConfig,
    pub warning: WarningConfig,
    pub tanks: TanksConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            frame_period_ms: FRAME_PERIOD_MS,
            seed: None,
            speed: SpeedConfig::default(),
            rpm: RpmConfig::default(),
            fuel: FuelConfig::default(),
            temperature: TemperatureConfig::default(),
            battery: BatteryConfig::default(),
            odometer: OdometerConfig::default(),
            warning: WarningConfig::default(),
            tanks: TanksConfig::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimulatorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("frame_period_ms", self.frame_period_ms),
            ("rpm.period_ms", self.rpm.period_ms),
            ("battery.period_ms", self.battery.period_ms),
            ("odometer.period_ms", self.odometer.period_ms),
            ("warning.period_ms", self.warning.period_ms),
            ("tanks.period_ms", self.tanks.period_ms),
        ];
        for (field, period) in periods {
            if period == 0 {
                return Err(ConfigError::InvalidValue { field, reason: "period must be non-zero" });
            }
            if period > MAX_PERIOD_MS {
                return Err(ConfigError::InvalidValue { field, reason: "period exceeds one hour" });
            }
        }

        let phases = [
            ("speed.acceleration_ms", self.speed.acceleration_ms),
            ("speed.deceleration_ms", self.speed.deceleration_ms),
            ("speed.pause_ms", self.speed.pause_ms),
            ("warning.active_ms", self.warning.active_ms),
        ];
        for (field, duration) in phases {
            if duration > MAX_PERIOD_MS {
                return Err(ConfigError::InvalidValue { field, reason: "duration exceeds one hour" });
            }
        }

        // At most one warning clear may be pending at a time
        if self.warning.active_ms >= self.warning.period_ms {
            return Err(ConfigError::InvalidValue {
                field: "warning.active_ms",
                reason: "pulse must end before the next one starts",
            });
        }

        if self.speed.cycle_ms() == 0 {
            return Err(ConfigError::InvalidValue { field: "speed", reason: "cycle length must be non-zero" });
        }
        if !(self.speed.max_speed > 0.0) {
            return Err(ConfigError::InvalidValue { field: "speed.max_speed", reason: "must be positive" });
        }
        if self.rpm.idle > self.rpm.max {
            return Err(ConfigError::InvalidValue { field: "rpm.idle", reason: "idle exceeds max" });
        }
        if !(self.rpm.jitter >= 0.0) {
            return Err(ConfigError::InvalidValue { field: "rpm.jitter", reason: "must not be negative" });
        }
        if self.battery.min > self.battery.max {
            return Err(ConfigError::InvalidValue { field: "battery.min", reason: "min exceeds max" });
        }
        if self.battery.service_min > self.battery.service_max {
            return Err(ConfigError::InvalidValue { field: "battery.service_min", reason: "min exceeds max" });
        }
        if self.temperature.min > self.temperature.max {
            return Err(ConfigError::InvalidValue { field: "temperature.min", reason: "min exceeds max" });
        }

        Ok(())
    }
}
