use serde::{Deserialize, Serialize};

use crate::config::{HwsConfig, ModeConfig, Thresholds};
use crate::error::ConfigError;

/// A band of the day. It runs from `start_hour` until the next band starts;
/// the latest band wraps past midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBand {
    pub start_hour: u8,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMode {
    pub name: String,
    pub thresholds: Thresholds,
    /// The poor-weather threshold variant was selected.
    pub poor_weather_applied: bool,
}

#[derive(Debug, Clone)]
struct ModeEntry {
    name: String,
    config: ModeConfig,
    weather_sensitive: bool,
}

/// Mode table compiled from a validated config. Every hour of the day is
/// mapped to exactly one mode up front, so resolution cannot fail.
#[derive(Debug, Clone)]
pub struct ModeTable {
    entries: Vec<ModeEntry>,
    hourly: [usize; 24],
    super_heat: usize,
}

impl ModeTable {
    pub fn new(config: &HwsConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let entries: Vec<ModeEntry> = config
            .modes
            .iter()
            .map(|(name, mode)| ModeEntry {
                name: name.clone(),
                config: mode.clone(),
                weather_sensitive: config.weather.sensitive_modes.contains(name),
            })
            .collect();
        let index_of = |name: &str| entries.iter().position(|entry| entry.name == name);

        let mut bands = config.time_bands.clone();
        bands.sort_by_key(|band| band.start_hour);

        let mut hourly = [0usize; 24];
        for hour in 0..24u8 {
            // Last band started at or before this hour, else wrap to the day's final band.
            let band = bands
                .iter()
                .rev()
                .find(|band| band.start_hour <= hour)
                .or_else(|| bands.last())
                .ok_or(ConfigError::NoTimeBands)?;

            hourly[hour as usize] =
                index_of(&band.mode).ok_or_else(|| ConfigError::UnknownBandMode {
                    start_hour: band.start_hour,
                    mode: band.mode.clone(),
                })?;
        }

        let super_heat = index_of(&config.super_heat_mode)
            .ok_or_else(|| ConfigError::UnknownSuperHeatMode(config.super_heat_mode.clone()))?;

        Ok(Self {
            entries,
            hourly,
            super_heat,
        })
    }

    pub fn mode_for_hour(&self, hour: u8) -> &str {
        &self.entries[self.hourly[usize::from(hour % 24)]].name
    }

    /// Picks the mode and its thresholds. Super heat wins over schedule and
    /// weather; otherwise poor weather swaps in the alternate thresholds for
    /// weather-sensitive modes that define them.
    pub fn resolve(&self, hour: u8, super_heat: bool, poor_weather: bool) -> ResolvedMode {
        if super_heat {
            let entry = &self.entries[self.super_heat];
            return ResolvedMode {
                name: entry.name.clone(),
                thresholds: entry.config.normal,
                poor_weather_applied: false,
            };
        }

        let entry = &self.entries[self.hourly[usize::from(hour % 24)]];
        match entry.config.poor_weather {
            Some(poor) if poor_weather && entry.weather_sensitive => ResolvedMode {
                name: entry.name.clone(),
                thresholds: poor,
                poor_weather_applied: true,
            },
            _ => ResolvedMode {
                name: entry.name.clone(),
                thresholds: entry.config.normal,
                poor_weather_applied: false,
            },
        }
    }

    pub fn mode_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModeTable {
        ModeTable::new(&HwsConfig::default()).unwrap()
    }

    #[test]
    fn every_hour_maps_to_a_configured_mode() {
        let table = table();
        let names: Vec<&str> = table.mode_names().collect();

        for hour in 0..24u8 {
            let mode = table.mode_for_hour(hour);
            assert!(names.contains(&mode), "hour {hour} mapped to {mode}");
            assert_eq!(table.resolve(hour, false, false).name, mode);
        }
    }

    #[test]
    fn bands_follow_start_hours_and_wrap_midnight() {
        let table = table();

        assert_eq!(table.mode_for_hour(0), "night");
        assert_eq!(table.mode_for_hour(4), "night");
        assert_eq!(table.mode_for_hour(5), "morning");
        assert_eq!(table.mode_for_hour(10), "daytime");
        assert_eq!(table.mode_for_hour(12), "midday");
        assert_eq!(table.mode_for_hour(16), "daytime");
        assert_eq!(table.mode_for_hour(18), "evening_prep");
        assert_eq!(table.mode_for_hour(23), "night");
    }

    #[test]
    fn unsorted_bands_are_accepted() {
        let mut config = HwsConfig::default();
        config.time_bands.reverse();
        let table = ModeTable::new(&config).unwrap();

        assert_eq!(table.mode_for_hour(13), "midday");
        assert_eq!(table.mode_for_hour(2), "night");
    }

    #[test]
    fn super_heat_overrides_hour_and_weather() {
        let table = table();

        for hour in 0..24u8 {
            let resolved = table.resolve(hour, true, true);
            assert_eq!(resolved.name, "super_heat");
            assert_eq!(resolved.thresholds, Thresholds::new(60.0, 58.0, 58.0));
            assert!(!resolved.poor_weather_applied);
        }
    }

    #[test]
    fn poor_weather_only_affects_sensitive_modes() {
        let table = table();

        let daytime = table.resolve(10, false, true);
        assert_eq!(daytime.thresholds, Thresholds::new(45.0, 40.0, 45.0));
        assert!(daytime.poor_weather_applied);

        let evening = table.resolve(18, false, true);
        assert_eq!(evening.thresholds, Thresholds::new(55.0, 50.0, 55.0));
        assert!(!evening.poor_weather_applied);
    }

    #[test]
    fn sensitive_mode_without_variant_keeps_normal_thresholds() {
        let mut config = HwsConfig::default();
        if let Some(mode) = config.modes.get_mut("midday") {
            mode.poor_weather = None;
        }
        let table = ModeTable::new(&config).unwrap();

        let midday = table.resolve(13, false, true);
        assert_eq!(midday.thresholds, Thresholds::new(30.0, 25.0, 30.0));
        assert!(!midday.poor_weather_applied);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = HwsConfig::default();
        config.time_bands[0].mode = "dawn".to_string();

        assert!(ModeTable::new(&config).is_err());
    }
}
