//! Dashboard preferences persisted as a single JSON document.
//!
//! The file holds one top-level key, [`STORAGE_KEY`], whose value is the
//! settings object. Stored values are deep-merged over the defaults on load
//! so preferences added in later versions pick up their default values.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const STORAGE_KEY: &str = "camper_settings";

pub const SECTIONS: [&str; 6] = ["vehicle", "navigation", "media", "interface", "system", "calibration"];

const KMH_TO_MPH: f64 = 0.621371;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown settings section '{0}'")]
    UnknownSection(String),

    #[error("Settings section '{0}' must be a JSON object")]
    NotAnObject(String),
}

pub fn default_settings() -> Value {
    json!({
        "vehicle": {
            "name": "Il Mio Camper",
            "type": "camper",
            "fuelType": "diesel",
            "fuelConsumption": 10.0,
            "fuelPrice": 1.70,
            "tankCapacity": 100,
            "waterTankCapacity": 100,
            "greyWaterCapacity": 100,
            "blackWaterCapacity": 100
        },
        "navigation": {
            "vehicleProfile": "camper",
            "avoidTolls": false,
            "avoidHighways": false,
            "avoidFerries": false,
            "showPOI": true,
            "poiTypes": ["camper_area", "gas_station"]
        },
        "media": {
            "defaultVolume": 70,
            "autoPlay": false,
            "favoriteStations": [],
            "lastSource": "radio"
        },
        "interface": {
            "theme": "dark",
            "units": "metric",
            "language": "it",
            "splashscreen": {
                "enabled": true,
                "type": "none",
                "imagePath": null,
                "videoPath": null,
                "duration": 3000
            },
            "showAnimations": true,
            "fontSize": "medium"
        },
        "system": {
            "dateFormat": "DD/MM/YYYY",
            "timeFormat": "24h",
            "autoBackup": true,
            "useMockData": false
        },
        "calibration": {
            "speedOffset": 0,
            "fuelLevelOffset": 0,
            "temperatureOffset": 0
        }
    })
}

/// Recursively merges `source` over `target`. Objects merge key by key;
/// every other value in `source` replaces the one in `target`.
pub fn merge_deep(target: &Value, source: &Value) -> Value {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            let mut output = target_map.clone();
            for (key, source_value) in source_map {
                let merged = match output.get(key) {
                    Some(target_value) if source_value.is_object() => merge_deep(target_value, source_value),
                    _ => source_value.clone(),
                };
                output.insert(key.clone(), merged);
            }
            Value::Object(output)
        }
        _ => source.clone(),
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    settings: Value,
}

impl SettingsStore {
    /// Loads settings from `path`, creating the file with defaults when it
    /// does not exist yet. A corrupt file is logged and replaced by
    /// defaults in memory; it is only overwritten on the next save.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            let store = Self {
                path: Some(path),
                settings: default_settings(),
            };
            store.save()?;
            return Ok(store);
        }

        let contents = std::fs::read_to_string(&path)?;
        let settings = match Self::parse_document(&contents) {
            Ok(stored) => merge_deep(&default_settings(), &stored),
            Err(e) => {
                warn!("Failed to load settings from {}: {}", path.display(), e);
                default_settings()
            }
        };

        Ok(Self {
            path: Some(path),
            settings,
        })
    }

    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            settings: default_settings(),
        }
    }

    fn parse_document(contents: &str) -> Result<Value, SettingsError> {
        let document: Value = serde_json::from_str(contents)?;
        match document.get(STORAGE_KEY) {
            Some(stored) if stored.is_object() => Ok(stored.clone()),
            Some(_) => Err(SettingsError::NotAnObject(STORAGE_KEY.to_string())),
            None => Ok(Value::Object(Map::new())),
        }
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let document = json!({ STORAGE_KEY: self.settings });
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
        Ok(())
    }

    pub fn all(&self) -> &Value {
        &self.settings
    }

    pub fn section(&self, section: &str) -> Option<&Value> {
        self.settings.get(section)
    }

    /// Shallow-merges `data` into an existing section and saves.
    pub fn update_section(&mut self, section: &str, data: Value) -> Result<(), SettingsError> {
        let Value::Object(data) = data else {
            return Err(SettingsError::NotAnObject(section.to_string()));
        };

        let target = self.section_mut(section)?;
        for (key, value) in data {
            target.insert(key, value);
        }
        self.save()
    }

    /// Sets a single key of an existing section and saves.
    pub fn update(&mut self, section: &str, key: &str, value: Value) -> Result<(), SettingsError> {
        self.section_mut(section)?.insert(key.to_string(), value);
        self.save()
    }

    /// Restores one section, or everything when `section` is `None`.
    pub fn reset(&mut self, section: Option<&str>) -> Result<(), SettingsError> {
        let defaults = default_settings();
        match section {
            Some(name) => {
                let default_section = defaults
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SettingsError::UnknownSection(name.to_string()))?;
                self.settings[name] = default_section;
            }
            None => self.settings = defaults,
        }
        info!("Settings reset ({})", section.unwrap_or("all sections"));
        self.save()
    }

    pub fn export(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(&self.settings)?)
    }

    /// Replaces the settings with `json` merged over the defaults.
    pub fn import(&mut self, json: &str) -> Result<(), SettingsError> {
        let imported: Value = serde_json::from_str(json)?;
        if !imported.is_object() {
            return Err(SettingsError::NotAnObject(STORAGE_KEY.to_string()));
        }
        self.settings = merge_deep(&default_settings(), &imported);
        self.save()
    }

    fn section_mut(&mut self, section: &str) -> Result<&mut Map<String, Value>, SettingsError> {
        match self.settings.get_mut(section) {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(SettingsError::NotAnObject(section.to_string())),
            None => Err(SettingsError::UnknownSection(section.to_string())),
        }
    }

    fn imperial(&self) -> bool {
        self.settings["interface"]["units"].as_str() == Some("imperial")
    }

    pub fn convert_speed(&self, kmh: f64) -> f64 {
        if self.imperial() {
            kmh * KMH_TO_MPH
        } else {
            kmh
        }
    }

    pub fn convert_temperature(&self, celsius: f64) -> f64 {
        if self.imperial() {
            celsius * 9.0 / 5.0 + 32.0
        } else {
            celsius
        }
    }

    pub fn speed_unit(&self) -> &'static str {
        if self.imperial() {
            "mph"
        } else {
            "km/h"
        }
    }

    pub fn temperature_unit(&self) -> &'static str {
        if self.imperial() {
            "°F"
        } else {
            "°C"
        }
    }

    /// Fuel cost of driving `distance_km` at the configured consumption
    /// (L/100km) and price per litre.
    pub fn fuel_cost(&self, distance_km: f64) -> f64 {
        let vehicle = &self.settings["vehicle"];
        let consumption = vehicle["fuelConsumption"].as_f64().unwrap_or(0.0);
        let price = vehicle["fuelPrice"].as_f64().unwrap_or(0.0);
        distance_km / 100.0 * consumption * price
    }

    pub fn format_fuel_cost(&self, distance_km: f64) -> String {
        format!("€ {:.2}", self.fuel_cost(distance_km))
    }

    pub fn splash_screen_enabled(&self) -> bool {
        self.settings["interface"]["splashscreen"]["enabled"].as_bool().unwrap_or(true)
    }

    pub fn use_mock_data(&self) -> bool {
        self.settings["system"]["useMockData"].as_bool().unwrap_or(false)
    }
}
