pub const TOPIC_SENSOR_TANK: &str = "hws/sensor/tank";
pub const TOPIC_SENSOR_STATUS: &str = "hws/sensor/status";

pub const TOPIC_STATE_DISABLE_AUTO_CONTROL: &str = "hws/state/disable_auto_control";
pub const TOPIC_STATE_HOT_WATER_ELEMENT: &str = "hws/state/hot_water_element";
pub const TOPIC_STATE_SUPER_HEAT: &str = "hws/state/super_heat";
pub const TOPIC_STATE_ENERGY_MANAGEMENT: &str = "hws/state/energy_management_hws_active";

pub const TOPIC_WEATHER_CLOUD_COVER: &str = "hws/weather/cloud_cover";
pub const TOPIC_WEATHER_SOLAR_IRRADIANCE: &str = "hws/weather/solar_irradiance";
pub const TOPIC_WEATHER_FORECAST: &str = "hws/weather/forecast_next_6h";

pub const TOPIC_CMD_ELEMENT: &str = "hws/cmnd/element";
/// Stream identifier for setpoint analytics records.
pub const TOPIC_SETPOINT_LOG: &str = "hws/log/setpoints";
pub const TOPIC_CONTROLLER_STATE: &str = "hws/controller/state";
