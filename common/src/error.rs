use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("time band at {start_hour}:00 references unknown mode `{mode}`")]
    UnknownBandMode { start_hour: u8, mode: String },

    #[error("weather-sensitive mode `{0}` is not defined")]
    UnknownSensitiveMode(String),

    #[error("super heat mode `{0}` is not defined")]
    UnknownSuperHeatMode(String),

    #[error("no time bands configured")]
    NoTimeBands,

    #[error("time band start hour {0} is outside 0..24")]
    BandHourOutOfRange(u8),

    #[error("two time bands start at {0}:00")]
    DuplicateBandStart(u8),

    #[error("mode `{mode}` has a non-finite threshold")]
    NonFiniteThreshold { mode: String },

    #[error("weather thresholds must be finite and non-negative")]
    InvalidWeatherThresholds,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    #[error("sensor field `{0}` is missing")]
    Missing(&'static str),

    #[error("sensor field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeatherError {
    #[error("weather field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("weather field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f32 },
}
