use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReadingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementState {
    #[default]
    Off,
    On,
}

impl ElementState {
    pub fn from_flag(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Relay payload: `0` for off, `1` for on.
    pub fn payload(self) -> &'static str {
        match self {
            Self::Off => "0",
            Self::On => "1",
        }
    }
}

/// What the controller asks of the relay collaborator. `NoAction` means
/// "leave the relay alone", which is not the same as re-sending the
/// current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementCommand {
    #[default]
    NoAction,
    SetElement(ElementState),
}

impl ElementCommand {
    pub fn payload(self) -> Option<&'static str> {
        match self {
            Self::NoAction => None,
            Self::SetElement(state) => Some(state.payload()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMode {
    #[default]
    AutoControl,
    EnergyMgmt,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoControl => "AUTO_CONTROL",
            Self::EnergyMgmt => "ENERGY_MGMT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub s2: f32,
    pub s3: f32,
    pub s4: f32,
    pub uptime_seconds: u64,
}

impl SensorReading {
    /// Extracts tank temperatures and uptime from an inbound sensor message.
    /// Unknown fields are ignored. A missing or unusable `time` counts as zero
    /// uptime rather than an invalid reading.
    pub fn from_message(message: &Value) -> Result<Self, ReadingError> {
        let s2 = numeric_field(message, "s2")?;
        let s3 = numeric_field(message, "s3")?;
        let s4 = numeric_field(message, "s4")?;
        let uptime_seconds = numeric_field(message, "time")
            .ok()
            .filter(|seconds| *seconds >= 0.0)
            .map(|seconds| seconds as u64)
            .unwrap_or(0);

        Ok(Self {
            s2,
            s3,
            s4,
            uptime_seconds,
        })
    }
}

fn numeric_field(message: &Value, field: &'static str) -> Result<f32, ReadingError> {
    let raw = message.get(field).ok_or(ReadingError::Missing(field))?;
    let parsed = match raw {
        Value::Number(number) => number.as_f64().map(|value| value as f32),
        Value::String(text) => text.trim().parse::<f32>().ok(),
        Value::Null => return Err(ReadingError::Missing(field)),
        _ => None,
    };

    match parsed {
        Some(value) if value.is_finite() => Ok(value),
        _ => Err(ReadingError::NotNumeric {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Weather values as last written by the weather pipeline. Kept unparsed so
/// malformed telemetry is caught by the classifier instead of the writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWeather {
    pub cloud_cover: Option<String>,
    pub solar_irradiance: Option<String>,
    pub forecast_next_6h: Option<String>,
}

/// Process-wide state written by external collaborators and read once per pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalInputs {
    pub disable_auto_control: bool,
    pub hot_water_element: ElementState,
    pub super_heat: bool,
    pub energy_management_hws_active: bool,
    pub weather: RawWeather,
}

/// Parses the 0/1 style flags written by other collaborators.
pub fn parse_flag(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Controller memory carried from one pass to the next. Starts in the
/// "never run" state and lives for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlState {
    #[serde(rename = "lastRunMs")]
    pub last_run_ms: Option<i64>,
    #[serde(rename = "lastElementSwitchMs")]
    pub last_element_switch_ms: Option<i64>,
    #[serde(rename = "lastControlMode")]
    pub last_control_mode: ControlMode,
    #[serde(rename = "lastLoggedSetpoint")]
    pub last_logged_setpoint: Option<SetpointKey>,
}

/// The fields compared when setpoint logging is limited to changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetpointKey {
    pub mode: String,
    pub switch_off_temp: f32,
    pub switch_on_temp: f32,
    pub switch_on_s4_temp: f32,
    pub poor_weather_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetpointLogRecord {
    pub mode: String,
    pub switch_off_temp: f32,
    pub switch_on_temp: f32,
    pub switch_on_s4_temp: f32,
    pub hot_water_level_pct: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_cover_pct: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solar_irradiance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_forecast: Option<String>,
    pub poor_weather_mode: bool,
    pub s2_current: f32,
    pub s3_current: f32,
    pub s4_current: f32,
    pub margin_to_switch_on: f32,
    pub margin_to_switch_off: f32,
    pub hour_of_day: u8,
    pub timestamp: i64,
    pub control_state: &'static str,
    pub energy_mgmt_active: bool,
    pub disable_auto_control: bool,
}

impl SetpointLogRecord {
    pub fn key(&self) -> SetpointKey {
        SetpointKey {
            mode: self.mode.clone(),
            switch_off_temp: self.switch_off_temp,
            switch_on_temp: self.switch_on_temp,
            switch_on_s4_temp: self.switch_on_s4_temp,
            poor_weather_mode: self.poor_weather_mode,
        }
    }
}
