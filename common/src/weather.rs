use serde::Serialize;

use crate::config::WeatherConfig;
use crate::error::WeatherError;
use crate::types::RawWeather;

pub const UNKNOWN_FORECAST: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    pub cloud_cover_pct: f32,
    pub solar_irradiance: f32,
    pub forecast_label: String,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            cloud_cover_pct: 0.0,
            solar_irradiance: 0.0,
            forecast_label: UNKNOWN_FORECAST.to_string(),
        }
    }
}

impl WeatherSnapshot {
    /// Absent fields fall back to "no cloud / no irradiance / unknown".
    /// Present but malformed fields are an error.
    pub fn read(raw: &RawWeather) -> Result<Self, WeatherError> {
        let cloud_cover_pct = parse_number(raw.cloud_cover.as_deref(), "cloud_cover")?;
        if !(0.0..=100.0).contains(&cloud_cover_pct) {
            return Err(WeatherError::OutOfRange {
                field: "cloud_cover",
                value: cloud_cover_pct,
            });
        }

        let solar_irradiance = parse_number(raw.solar_irradiance.as_deref(), "solar_irradiance")?;
        if solar_irradiance < 0.0 {
            return Err(WeatherError::OutOfRange {
                field: "solar_irradiance",
                value: solar_irradiance,
            });
        }

        let forecast_label = raw
            .forecast_next_6h
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(UNKNOWN_FORECAST)
            .to_string();

        Ok(Self {
            cloud_cover_pct,
            solar_irradiance,
            forecast_label,
        })
    }
}

fn parse_number(raw: Option<&str>, field: &'static str) -> Result<f32, WeatherError> {
    let Some(text) = raw else {
        return Ok(0.0);
    };
    match text.trim().parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(WeatherError::NotNumeric {
            field,
            value: text.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAssessment {
    pub poor: bool,
    pub snapshot: WeatherSnapshot,
    /// Set when the weather state could not be read and the fail-safe applied.
    pub read_error: Option<WeatherError>,
}

/// Classifies solar conditions. Heavy cloud with weak irradiance, or an
/// overcast forecast, counts as poor. A read error never counts as poor.
pub fn assess(config: &WeatherConfig, raw: &RawWeather) -> WeatherAssessment {
    match WeatherSnapshot::read(raw) {
        Ok(snapshot) => {
            let cloudy_and_dim = snapshot.cloud_cover_pct > config.cloud_cover_threshold
                && snapshot.solar_irradiance < config.irradiance_threshold;
            let overcast = snapshot
                .forecast_label
                .eq_ignore_ascii_case(config.overcast_label.trim());

            WeatherAssessment {
                poor: cloudy_and_dim || overcast,
                snapshot,
                read_error: None,
            }
        }
        Err(err) => WeatherAssessment {
            poor: false,
            snapshot: WeatherSnapshot::default(),
            read_error: Some(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(cloud: Option<&str>, irradiance: Option<&str>, forecast: Option<&str>) -> RawWeather {
        RawWeather {
            cloud_cover: cloud.map(str::to_string),
            solar_irradiance: irradiance.map(str::to_string),
            forecast_next_6h: forecast.map(str::to_string),
        }
    }

    #[test]
    fn cloud_and_low_irradiance_is_poor() {
        let config = WeatherConfig::default();

        assert!(assess(&config, &raw(Some("85"), Some("120"), Some("cloudy"))).poor);
        // Cloudy but still bright enough.
        assert!(!assess(&config, &raw(Some("85"), Some("450"), Some("cloudy"))).poor);
        // Dim but clear sky.
        assert!(!assess(&config, &raw(Some("40"), Some("120"), Some("clear"))).poor);
    }

    #[test]
    fn overcast_forecast_is_poor_on_its_own() {
        let config = WeatherConfig::default();
        let assessment = assess(&config, &raw(Some("10"), Some("800"), Some(" Overcast ")));

        assert!(assessment.poor);
        assert_eq!(assessment.snapshot.forecast_label, "Overcast");
    }

    #[test]
    fn absent_weather_defaults_to_clear() {
        let assessment = assess(&WeatherConfig::default(), &RawWeather::default());

        assert!(!assessment.poor);
        assert_eq!(assessment.snapshot, WeatherSnapshot::default());
        assert!(assessment.read_error.is_none());
    }

    #[test]
    fn malformed_weather_fails_safe() {
        let config = WeatherConfig::default();

        let assessment = assess(&config, &raw(Some("lots"), Some("10"), Some("overcast")));
        assert!(!assessment.poor);
        assert_eq!(assessment.snapshot, WeatherSnapshot::default());
        assert!(matches!(
            assessment.read_error,
            Some(WeatherError::NotNumeric { field: "cloud_cover", .. })
        ));

        let assessment = assess(&config, &raw(Some("90"), Some("-5"), None));
        assert!(!assessment.poor);
        assert!(matches!(
            assessment.read_error,
            Some(WeatherError::OutOfRange { field: "solar_irradiance", .. })
        ));
    }
}
