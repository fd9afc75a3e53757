use core::fmt;
use serde::{Deserialize, Serialize};

const INITIAL_FUEL_LEVEL: f64 = 75.0;
const INITIAL_WATER_TANK: f64 = 80.0;
const INITIAL_GREY_WATER: f64 = 20.0;
const INITIAL_BLACK_WATER: f64 = 15.0;
const INITIAL_BATTERY_MAIN: f64 = 12.4;
const INITIAL_BATTERY_SERVICE: f64 = 13.2;
const INITIAL_TEMPERATURE_INSIDE: f64 = 22.0;
const INITIAL_TEMPERATURE_OUTSIDE: f64 = 18.0;
const INITIAL_ENGINE_TEMP: f64 = 22.0;
const INITIAL_TOTAL_KM: f64 = 45328.0;
const INITIAL_TRIP_KM: f64 = 123.4;

/// Gearbox position, serialized the way the dashboards display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gear {
    #[default]
    #[serde(rename = "N")]
    Neutral,
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
    #[serde(rename = "4")]
    Fourth,
    #[serde(rename = "5")]
    Fifth,
    #[serde(rename = "6")]
    Sixth,
}

impl Gear {
    /// Gear selected for a given road speed in km/h.
    pub fn from_speed(speed: f64) -> Self {
        if speed <= 0.0 {
            Gear::Neutral
        } else if speed < 20.0 {
            Gear::First
        } else if speed < 40.0 {
            Gear::Second
        } else if speed < 60.0 {
            Gear::Third
        } else if speed < 80.0 {
            Gear::Fourth
        } else if speed < 100.0 {
            Gear::Fifth
        } else {
            Gear::Sixth
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gear::Neutral => "N",
            Gear::First => "1",
            Gear::Second => "2",
            Gear::Third => "3",
            Gear::Fourth => "4",
            Gear::Fifth => "5",
            Gear::Sixth => "6",
        }
    }
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    FuelLow,
    EngineTemp,
    BatteryLow,
    OilPressure,
}

impl WarningKind {
    pub const ALL: [WarningKind; 4] = [
        WarningKind::FuelLow,
        WarningKind::EngineTemp,
        WarningKind::BatteryLow,
        WarningKind::OilPressure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WarningKind::FuelLow => "fuel_low",
            WarningKind::EngineTemp => "engine_temp",
            WarningKind::BatteryLow => "battery_low",
            WarningKind::OilPressure => "oil_pressure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Warnings {
    pub fuel_low: bool,
    pub engine_temp: bool,
    pub battery_low: bool,
    pub oil_pressure: bool,
}

impl Warnings {
    pub fn get(&self, kind: WarningKind) -> bool {
        match kind {
            WarningKind::FuelLow => self.fuel_low,
            WarningKind::EngineTemp => self.engine_temp,
            WarningKind::BatteryLow => self.battery_low,
            WarningKind::OilPressure => self.oil_pressure,
        }
    }

    pub fn set(&mut self, kind: WarningKind, on: bool) {
        match kind {
            WarningKind::FuelLow => self.fuel_low = on,
            WarningKind::EngineTemp => self.engine_temp = on,
            WarningKind::BatteryLow => self.battery_low = on,
            WarningKind::OilPressure => self.oil_pressure = on,
        }
    }

    pub fn clear_all(&mut self) {
        *self = Warnings::default();
    }

    pub fn active(&self) -> impl Iterator<Item = WarningKind> + '_ {
        WarningKind::ALL.into_iter().filter(|kind| self.get(*kind))
    }
}

/// Exterior and cabin lights. Only ever changed by an explicit toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lights {
    pub headlights: bool,
    pub position: bool,
    pub interior: bool,
    pub awning: bool,
}

impl Lights {
    pub const IDS: [&'static str; 4] = ["headlights", "position", "interior", "awning"];

    /// Flips the named light. Returns `false` for an unknown id.
    pub fn toggle(&mut self, id: &str) -> bool {
        let slot = match id {
            "headlights" => &mut self.headlights,
            "position" => &mut self.position,
            "interior" => &mut self.interior,
            "awning" => &mut self.awning,
            _ => return false,
        };
        *slot = !*slot;
        true
    }
}

/// Door open/closed flags. Only ever changed by an explicit toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Doors {
    pub driver: bool,
    pub passenger: bool,
    pub sliding: bool,
    pub rear: bool,
}

impl Doors {
    pub const IDS: [&'static str; 4] = ["driver", "passenger", "sliding", "rear"];

    /// Flips the named door. Returns `false` for an unknown id.
    pub fn toggle(&mut self, id: &str) -> bool {
        let slot = match id {
            "driver" => &mut self.driver,
            "passenger" => &mut self.passenger,
            "sliding" => &mut self.sliding,
            "rear" => &mut self.rear,
            _ => return false,
        };
        *slot = !*slot;
        true
    }
}

/// Full vehicle telemetry record.
///
/// Field names match the `/api/status` payload of the vehicle backend so a
/// serialized snapshot can stand in for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub speed: f64,
    pub rpm: f64,
    pub fuel_level: f64,
    pub water_tank: f64,
    pub grey_water: f64,
    pub black_water: f64,
    pub battery_main: f64,
    pub battery_service: f64,
    pub temperature_inside: f64,
    pub temperature_outside: f64,
    pub engine_temp: f64,
    pub engine_running: bool,
    pub total_km: f64,
    pub trip_km: f64,
    pub gear: Gear,
    pub warnings: Warnings,
    pub lights: Lights,
    pub doors: Doors,
}

impl VehicleState {
    /// Parked vehicle: engine off, tanks part full, engine at ambient.
    pub fn new() -> Self {
        Self {
            speed: 0.0,
            rpm: 0.0,
            fuel_level: INITIAL_FUEL_LEVEL,
            water_tank: INITIAL_WATER_TANK,
            grey_water: INITIAL_GREY_WATER,
            black_water: INITIAL_BLACK_WATER,
            battery_main: INITIAL_BATTERY_MAIN,
            battery_service: INITIAL_BATTERY_SERVICE,
            temperature_inside: INITIAL_TEMPERATURE_INSIDE,
            temperature_outside: INITIAL_TEMPERATURE_OUTSIDE,
            engine_temp: INITIAL_ENGINE_TEMP,
            engine_running: false,
            total_km: INITIAL_TOTAL_KM,
            trip_km: INITIAL_TRIP_KM,
            gear: Gear::Neutral,
            warnings: Warnings::default(),
            lights: Lights::default(),
            doors: Doors::default(),
        }
    }
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gear_thresholds() {
        let table = [
            (0.0, Gear::Neutral),
            (1.0, Gear::First),
            (19.0, Gear::First),
            (20.0, Gear::Second),
            (39.0, Gear::Second),
            (40.0, Gear::Third),
            (59.0, Gear::Third),
            (60.0, Gear::Fourth),
            (79.0, Gear::Fourth),
            (80.0, Gear::Fifth),
            (99.0, Gear::Fifth),
            (100.0, Gear::Sixth),
            (120.0, Gear::Sixth),
        ];

        for (speed, expected) in table {
            assert_eq!(Gear::from_speed(speed), expected, "speed {}", speed);
        }
    }

    #[test]
    fn test_gear_serializes_as_display_label() {
        assert_eq!(serde_json::to_string(&Gear::Neutral).unwrap(), r#""N""#);
        assert_eq!(serde_json::to_string(&Gear::Fourth).unwrap(), r#""4""#);
        let parsed: Gear = serde_json::from_str(r#""6""#).unwrap();
        assert_eq!(parsed, Gear::Sixth);
    }

    #[test]
    fn test_unknown_light_is_rejected() {
        let mut lights = Lights::default();
        assert!(!lights.toggle("doesNotExist"));
        assert_eq!(lights, Lights::default());

        assert!(lights.toggle("awning"));
        assert!(lights.awning);
        assert!(lights.toggle("awning"));
        assert!(!lights.awning);
    }

    #[test]
    fn test_door_toggle() {
        let mut doors = Doors::default();
        assert!(doors.toggle("sliding"));
        assert!(doors.sliding);
        assert!(!doors.toggle("trunk"));
    }

    #[test]
    fn test_warnings_accessors() {
        let mut warnings = Warnings::default();
        warnings.set(WarningKind::OilPressure, true);
        assert!(warnings.get(WarningKind::OilPressure));
        assert_eq!(warnings.active().collect::<Vec<_>>(), vec![WarningKind::OilPressure]);

        warnings.clear_all();
        assert_eq!(warnings.active().count(), 0);
    }

    #[test]
    fn test_snapshot_field_names() {
        let json = serde_json::to_value(VehicleState::new()).unwrap();
        assert_eq!(json["fuel_level"], 75.0);
        assert_eq!(json["gear"], "N");
        assert_eq!(json["warnings"]["oil_pressure"], false);
        assert_eq!(json["lights"]["headlights"], false);
        assert_eq!(json["doors"]["rear"], false);
    }
}
