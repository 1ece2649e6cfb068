use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schedule::TimeBand;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// S3 above this turns the element off.
    pub switch_off_temp: f32,
    /// S3 below this is one of the two switch-on conditions.
    pub switch_on_temp: f32,
    /// S4 must be below this to switch on.
    pub switch_on_s4_temp: f32,
}

impl Thresholds {
    pub const fn new(switch_off_temp: f32, switch_on_temp: f32, switch_on_s4_temp: f32) -> Self {
        Self {
            switch_off_temp,
            switch_on_temp,
            switch_on_s4_temp,
        }
    }

    fn is_finite(&self) -> bool {
        self.switch_off_temp.is_finite()
            && self.switch_on_temp.is_finite()
            && self.switch_on_s4_temp.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub normal: Thresholds,
    #[serde(default)]
    pub poor_weather: Option<Thresholds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub cloud_cover_threshold: f32,
    pub irradiance_threshold: f32,
    pub overcast_label: String,
    pub sensitive_modes: Vec<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            cloud_cover_threshold: 70.0,
            irradiance_threshold: 200.0,
            overcast_label: "overcast".to_string(),
            sensitive_modes: vec![
                "morning".to_string(),
                "daytime".to_string(),
                "midday".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Controller uptime required before the element may be switched on.
    pub min_time_seconds: u64,
    pub min_switch_interval_minutes: u64,
    pub controller_interval_seconds: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_time_seconds: 600,
            min_switch_interval_minutes: 15,
            controller_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_setpoints: bool,
    pub log_on_change_only: bool,
    pub log_weather_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_setpoints: true,
            log_on_change_only: false,
            log_weather_data: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwsConfig {
    pub modes: BTreeMap<String, ModeConfig>,
    pub time_bands: Vec<TimeBand>,
    pub super_heat_mode: String,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for HwsConfig {
    fn default() -> Self {
        let modes = [
            (
                "morning",
                Thresholds::new(50.0, 45.0, 50.0),
                Some(Thresholds::new(55.0, 50.0, 55.0)),
            ),
            (
                "daytime",
                Thresholds::new(35.0, 30.0, 35.0),
                Some(Thresholds::new(45.0, 40.0, 45.0)),
            ),
            (
                "midday",
                Thresholds::new(30.0, 25.0, 30.0),
                Some(Thresholds::new(45.0, 40.0, 45.0)),
            ),
            ("evening_prep", Thresholds::new(55.0, 50.0, 55.0), None),
            ("night", Thresholds::new(45.0, 40.0, 45.0), None),
            ("super_heat", Thresholds::new(60.0, 58.0, 58.0), None),
        ]
        .into_iter()
        .map(|(name, normal, poor_weather)| {
            (
                name.to_string(),
                ModeConfig {
                    normal,
                    poor_weather,
                },
            )
        })
        .collect();

        let time_bands = [
            (5, "morning"),
            (9, "daytime"),
            (12, "midday"),
            (15, "daytime"),
            (17, "evening_prep"),
            (21, "night"),
        ]
        .into_iter()
        .map(|(start_hour, mode)| TimeBand {
            start_hour,
            mode: mode.to_string(),
        })
        .collect();

        Self {
            modes,
            time_bands,
            super_heat_mode: "super_heat".to_string(),
            weather: WeatherConfig::default(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HwsConfig {
    /// Rejects configurations the controller cannot run on. Called once at
    /// load; everything downstream assumes a validated config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_bands.is_empty() {
            return Err(ConfigError::NoTimeBands);
        }

        let mut starts = BTreeSet::new();
        for band in &self.time_bands {
            if band.start_hour >= 24 {
                return Err(ConfigError::BandHourOutOfRange(band.start_hour));
            }
            if !starts.insert(band.start_hour) {
                return Err(ConfigError::DuplicateBandStart(band.start_hour));
            }
            if !self.modes.contains_key(&band.mode) {
                return Err(ConfigError::UnknownBandMode {
                    start_hour: band.start_hour,
                    mode: band.mode.clone(),
                });
            }
        }

        if !self.modes.contains_key(&self.super_heat_mode) {
            return Err(ConfigError::UnknownSuperHeatMode(
                self.super_heat_mode.clone(),
            ));
        }

        if let Some(unknown) = self
            .weather
            .sensitive_modes
            .iter()
            .find(|mode| !self.modes.contains_key(*mode))
        {
            return Err(ConfigError::UnknownSensitiveMode(unknown.clone()));
        }

        for (name, mode) in &self.modes {
            let poor_ok = mode.poor_weather.map(|t| t.is_finite()).unwrap_or(true);
            if !mode.normal.is_finite() || !poor_ok {
                return Err(ConfigError::NonFiniteThreshold { mode: name.clone() });
            }
        }

        let weather = &self.weather;
        if !weather.cloud_cover_threshold.is_finite()
            || !weather.irradiance_threshold.is_finite()
            || weather.cloud_cover_threshold < 0.0
            || weather.irradiance_threshold < 0.0
        {
            return Err(ConfigError::InvalidWeatherThresholds);
        }

        Ok(())
    }

    /// Threshold sets that will make the element oscillate. Reported, not rejected.
    pub fn soft_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, mode) in &self.modes {
            let variants = [("normal", Some(mode.normal)), ("poor_weather", mode.poor_weather)];
            for (variant, thresholds) in variants {
                let Some(thresholds) = thresholds else {
                    continue;
                };
                if thresholds.switch_on_temp >= thresholds.switch_off_temp {
                    warnings.push(format!(
                        "mode `{name}` ({variant}): switch_on_temp {} is not below switch_off_temp {}",
                        thresholds.switch_on_temp, thresholds.switch_off_temp
                    ));
                }
            }
        }
        warnings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub controller: HwsConfig,
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_http_port() -> u16 {
    8080
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: HwsConfig::default(),
            timezone: "Europe/London".to_string(),
            network: NetworkConfig::default(),
            http_port: default_http_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HwsConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert!(config.soft_warnings().is_empty());
    }

    #[test]
    fn rejects_unknown_band_mode() {
        let mut config = HwsConfig::default();
        config.time_bands[2].mode = "siesta".to_string();

        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownBandMode {
                start_hour: 12,
                mode: "siesta".to_string(),
            })
        );
    }

    #[test]
    fn rejects_bad_band_layout() {
        let mut config = HwsConfig::default();
        config.time_bands.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoTimeBands));

        let mut config = HwsConfig::default();
        config.time_bands[1].start_hour = 5;
        assert_eq!(config.validate(), Err(ConfigError::DuplicateBandStart(5)));

        let mut config = HwsConfig::default();
        config.time_bands[0].start_hour = 24;
        assert_eq!(config.validate(), Err(ConfigError::BandHourOutOfRange(24)));
    }

    #[test]
    fn rejects_unknown_override_references() {
        let mut config = HwsConfig::default();
        config.super_heat_mode = "boost".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownSuperHeatMode("boost".to_string()))
        );

        let mut config = HwsConfig::default();
        config.weather.sensitive_modes.push("dawn".to_string());
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownSensitiveMode("dawn".to_string()))
        );
    }

    #[test]
    fn inverted_hysteresis_is_only_a_warning() {
        let mut config = HwsConfig::default();
        if let Some(mode) = config.modes.get_mut("night") {
            mode.normal = Thresholds::new(40.0, 45.0, 45.0);
        }

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.soft_warnings().len(), 1);
    }

    #[test]
    fn runtime_config_fills_defaults() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{"timezone": "Australia/Sydney"}"#).unwrap();

        assert_eq!(runtime.http_port, 8080);
        assert_eq!(runtime.controller, HwsConfig::default());
        assert_eq!(runtime.network.mqtt_port, 1883);
    }
}
