pub mod config;
pub mod controller;
pub mod error;
pub mod schedule;
pub mod tank;
pub mod topics;
pub mod types;
pub mod weather;

pub use config::{HwsConfig, ModeConfig, RuntimeConfig, Thresholds};
pub use controller::{HotWaterController, Notice, PassOutcome, PassReport, SwitchDecision};
pub use error::{ConfigError, ReadingError, WeatherError};
pub use schedule::{ModeTable, ResolvedMode, TimeBand};
pub use topics::*;
pub use types::{
    ControlMode, ControlState, ElementCommand, ElementState, ExternalInputs, RawWeather,
    SensorReading, SetpointLogRecord,
};
pub use weather::{WeatherAssessment, WeatherSnapshot};
