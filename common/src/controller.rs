use chrono::{DateTime, FixedOffset, Timelike};
use serde_json::Value;

use crate::{
    config::{HwsConfig, Thresholds},
    error::{ConfigError, ReadingError, WeatherError},
    schedule::{ModeTable, ResolvedMode},
    tank::hot_water_level_pct,
    types::{
        ControlMode, ControlState, ElementCommand, ElementState, ExternalInputs, SensorReading,
        SetpointLogRecord,
    },
    weather::{self, WeatherAssessment},
};

/// Observations from a pass that the host should surface in its logs.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ControlModeChanged { from: ControlMode, to: ControlMode },
    /// Energy management is active but auto control has not been disabled.
    InconsistentAuthorityFlags,
    InvalidSensorInput(ReadingError),
    WeatherReadFailed(WeatherError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchDecision {
    Disabled,
    InvalidInput,
    TurnOn,
    TurnOff,
    Vetoed {
        target: ElementState,
        minutes_since_last_switch: f64,
    },
    Hold,
}

impl SwitchDecision {
    pub fn command(&self) -> ElementCommand {
        match self {
            Self::TurnOn => ElementCommand::SetElement(ElementState::On),
            Self::TurnOff => ElementCommand::SetElement(ElementState::Off),
            _ => ElementCommand::NoAction,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub command: ElementCommand,
    pub decision: SwitchDecision,
    pub control_mode: ControlMode,
    pub mode: ResolvedMode,
    pub weather: WeatherAssessment,
    pub record: Option<SetpointLogRecord>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Rate limited; nothing was evaluated.
    Skipped,
    Completed(PassReport),
}

#[derive(Debug, Clone)]
pub struct HotWaterController {
    config: HwsConfig,
    modes: ModeTable,
}

impl HotWaterController {
    pub fn new(config: HwsConfig) -> Result<Self, ConfigError> {
        let modes = ModeTable::new(&config)?;
        Ok(Self { config, modes })
    }

    pub fn config(&self) -> &HwsConfig {
        &self.config
    }

    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    /// Runs one controller pass for an inbound sensor message. `state` is the
    /// controller's own memory and is updated in place; `inputs` is the
    /// externally written state as of this pass.
    pub fn process(
        &self,
        state: &mut ControlState,
        message: &Value,
        inputs: &ExternalInputs,
        now: DateTime<FixedOffset>,
    ) -> PassOutcome {
        let now_ms = now.timestamp_millis();
        if !self.admit(state, now_ms) {
            return PassOutcome::Skipped;
        }

        let mut notices = Vec::new();
        let control_mode = self.monitor_control_state(state, inputs, &mut notices);

        let weather = weather::assess(&self.config.weather, &inputs.weather);
        if let Some(err) = &weather.read_error {
            notices.push(Notice::WeatherReadFailed(err.clone()));
        }

        let hour = now.hour() as u8;
        let mode = self.modes.resolve(hour, inputs.super_heat, weather.poor);

        let reading = SensorReading::from_message(message);
        if let Err(err) = &reading {
            notices.push(Notice::InvalidSensorInput(err.clone()));
        }

        let decision = self.decide(state, reading.as_ref().ok(), inputs, &mode.thresholds, now_ms);

        let record = reading.as_ref().ok().and_then(|reading| {
            self.log_setpoint(state, reading, &mode, &weather, inputs, now)
        });

        PassOutcome::Completed(PassReport {
            command: decision.command(),
            decision,
            control_mode,
            mode,
            weather,
            record,
            notices,
        })
    }

    /// Rate limiter. Stamps the run time before anything else so a pass that
    /// dies midway still counts as a run.
    fn admit(&self, state: &mut ControlState, now_ms: i64) -> bool {
        let interval_ms = self.config.timing.controller_interval_seconds as i64 * 1_000;
        if let Some(last) = state.last_run_ms {
            if (0..interval_ms).contains(&(now_ms - last)) {
                return false;
            }
        }
        state.last_run_ms = Some(now_ms);
        true
    }

    fn monitor_control_state(
        &self,
        state: &mut ControlState,
        inputs: &ExternalInputs,
        notices: &mut Vec<Notice>,
    ) -> ControlMode {
        let current = if inputs.energy_management_hws_active {
            ControlMode::EnergyMgmt
        } else {
            ControlMode::AutoControl
        };

        if current != state.last_control_mode {
            notices.push(Notice::ControlModeChanged {
                from: state.last_control_mode,
                to: current,
            });
        }

        // The energy manager owns both flags; a mismatch is reported, never corrected.
        if inputs.energy_management_hws_active && !inputs.disable_auto_control {
            notices.push(Notice::InconsistentAuthorityFlags);
        }

        state.last_control_mode = current;
        current
    }

    fn decide(
        &self,
        state: &mut ControlState,
        reading: Option<&SensorReading>,
        inputs: &ExternalInputs,
        thresholds: &Thresholds,
        now_ms: i64,
    ) -> SwitchDecision {
        if inputs.disable_auto_control {
            return SwitchDecision::Disabled;
        }

        let Some(reading) = reading else {
            return SwitchDecision::InvalidInput;
        };

        let target = match inputs.hot_water_element {
            ElementState::On if reading.s3 > thresholds.switch_off_temp => ElementState::Off,
            ElementState::Off
                if reading.uptime_seconds > self.config.timing.min_time_seconds
                    && reading.s3 < thresholds.switch_on_temp
                    && reading.s4 < thresholds.switch_on_s4_temp =>
            {
                ElementState::On
            }
            _ => return SwitchDecision::Hold,
        };

        if let Some(minutes) = self.minutes_since_last_switch(state, now_ms) {
            if minutes < self.config.timing.min_switch_interval_minutes as f64 {
                return SwitchDecision::Vetoed {
                    target,
                    minutes_since_last_switch: minutes,
                };
            }
        }

        state.last_element_switch_ms = Some(now_ms);
        match target {
            ElementState::On => SwitchDecision::TurnOn,
            ElementState::Off => SwitchDecision::TurnOff,
        }
    }

    /// On and off share one timestamp, so they cool down against each other.
    fn minutes_since_last_switch(&self, state: &ControlState, now_ms: i64) -> Option<f64> {
        state
            .last_element_switch_ms
            .map(|last| (now_ms - last) as f64 / 60_000.0)
    }

    fn log_setpoint(
        &self,
        state: &mut ControlState,
        reading: &SensorReading,
        mode: &ResolvedMode,
        weather: &WeatherAssessment,
        inputs: &ExternalInputs,
        now: DateTime<FixedOffset>,
    ) -> Option<SetpointLogRecord> {
        let logging = &self.config.logging;
        if !logging.log_setpoints {
            return None;
        }

        let thresholds = mode.thresholds;
        let snapshot = &weather.snapshot;
        let with_weather = logging.log_weather_data;

        let record = SetpointLogRecord {
            mode: mode.name.clone(),
            switch_off_temp: thresholds.switch_off_temp,
            switch_on_temp: thresholds.switch_on_temp,
            switch_on_s4_temp: thresholds.switch_on_s4_temp,
            hot_water_level_pct: hot_water_level_pct(reading.s2, reading.s3, reading.s4),
            cloud_cover_pct: with_weather.then_some(snapshot.cloud_cover_pct),
            solar_irradiance: with_weather.then_some(snapshot.solar_irradiance),
            weather_forecast: with_weather.then(|| snapshot.forecast_label.clone()),
            poor_weather_mode: weather.poor,
            s2_current: reading.s2,
            s3_current: reading.s3,
            s4_current: reading.s4,
            margin_to_switch_on: thresholds.switch_on_temp - reading.s3,
            margin_to_switch_off: reading.s3 - thresholds.switch_off_temp,
            hour_of_day: now.hour() as u8,
            timestamp: now.timestamp_millis(),
            control_state: state.last_control_mode.as_str(),
            energy_mgmt_active: inputs.energy_management_hws_active,
            disable_auto_control: inputs.disable_auto_control,
        };

        let key = record.key();
        if logging.log_on_change_only && state.last_logged_setpoint.as_ref() == Some(&key) {
            return None;
        }
        state.last_logged_setpoint = Some(key);
        Some(record)
    }
}
