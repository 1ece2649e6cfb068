use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use hws_common::{
    types::parse_flag, ControlState, ElementCommand, ElementState, ExternalInputs,
    HotWaterController, HwsConfig, Notice, PassOutcome, PassReport, RuntimeConfig,
    SetpointLogRecord, SwitchDecision, TOPIC_CMD_ELEMENT, TOPIC_CONTROLLER_STATE,
    TOPIC_SENSOR_TANK, TOPIC_SETPOINT_LOG, TOPIC_STATE_DISABLE_AUTO_CONTROL,
    TOPIC_STATE_ENERGY_MANAGEMENT, TOPIC_STATE_HOT_WATER_ELEMENT, TOPIC_STATE_SUPER_HEAT,
    TOPIC_WEATHER_CLOUD_COVER, TOPIC_WEATHER_FORECAST, TOPIC_WEATHER_SOLAR_IRRADIANCE,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 4 * 1024;

#[derive(Clone)]
struct AppState {
    // One lock around everything a pass reads then writes.
    core: Arc<Mutex<CoreState>>,
    inputs: Arc<Mutex<ExternalInputs>>,
    timezone: Tz,
    mqtt: AsyncClient,
}

struct CoreState {
    controller: HotWaterController,
    control: ControlState,
    last_record: Option<SetpointLogRecord>,
    last_command: Option<CommandView>,
}

#[derive(Debug, Clone, Serialize)]
struct CommandView {
    state: ElementState,
    #[serde(rename = "atEpochMs")]
    at_epoch_ms: i64,
}

#[derive(Debug, Serialize)]
struct StatusView {
    #[serde(rename = "controlState")]
    control_state: ControlState,
    inputs: ExternalInputs,
    #[serde(rename = "lastRecord")]
    last_record: Option<SetpointLogRecord>,
    #[serde(rename = "lastCommand")]
    last_command: Option<CommandView>,
    timezone: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct OverridesUpdate {
    disable_auto_control: Option<bool>,
    hot_water_element: Option<ElementState>,
    super_heat: Option<bool>,
    energy_management_hws_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WeatherUpdate {
    cloud_cover: Option<f32>,
    solar_irradiance: Option<f32>,
    forecast_next_6h: Option<String>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store
        .load_runtime_config()
        .await
        .with_context(|| format!("failed to load {}", store.runtime_path.display()))?;

    for warning in runtime.controller.soft_warnings() {
        warn!("threshold config: {warning}");
    }
    let controller = HotWaterController::new(runtime.controller.clone())
        .context("invalid controller configuration")?;
    let timezone: Tz = runtime
        .timezone
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid timezone {}: {err}", runtime.timezone))?;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("hws-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        core: Arc::new(Mutex::new(CoreState {
            controller,
            control: ControlState::default(),
            last_record: None,
            last_command: None,
        })),
        inputs: Arc::new(Mutex::new(ExternalInputs::default())),
        timezone,
        mqtt,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_state_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/config", get(handle_get_config))
        .route("/api/overrides", put(handle_put_overrides))
        .route("/api/weather", put(handle_put_weather))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("hot water controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_TANK,
        TOPIC_STATE_DISABLE_AUTO_CONTROL,
        TOPIC_STATE_HOT_WATER_ELEMENT,
        TOPIC_STATE_SUPER_HEAT,
        TOPIC_STATE_ENERGY_MANAGEMENT,
        TOPIC_WEATHER_CLOUD_COVER,
        TOPIC_WEATHER_SOLAR_IRRADIANCE,
        TOPIC_WEATHER_FORECAST,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;

            let payload = serde_json::to_vec(&status_view(&app_state).await);
            match payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    match topic.as_str() {
        TOPIC_SENSOR_TANK => {
            // Unparseable bodies still go through the pass so the input guard sees them.
            let body = serde_json::from_str::<Value>(&message).unwrap_or(Value::String(message));
            run_controller_pass(app_state, body).await?;
        }
        TOPIC_STATE_DISABLE_AUTO_CONTROL
        | TOPIC_STATE_HOT_WATER_ELEMENT
        | TOPIC_STATE_SUPER_HEAT
        | TOPIC_STATE_ENERGY_MANAGEMENT => {
            let Some(flag) = parse_flag(&message) else {
                warn!("ignoring non-boolean payload {message:?} on {topic}");
                return Ok(());
            };
            let mut inputs = app_state.inputs.lock().await;
            match topic.as_str() {
                TOPIC_STATE_DISABLE_AUTO_CONTROL => inputs.disable_auto_control = flag,
                TOPIC_STATE_HOT_WATER_ELEMENT => {
                    inputs.hot_water_element = ElementState::from_flag(flag)
                }
                TOPIC_STATE_SUPER_HEAT => inputs.super_heat = flag,
                _ => inputs.energy_management_hws_active = flag,
            }
        }
        TOPIC_WEATHER_CLOUD_COVER => {
            app_state.inputs.lock().await.weather.cloud_cover = Some(message);
        }
        TOPIC_WEATHER_SOLAR_IRRADIANCE => {
            app_state.inputs.lock().await.weather.solar_irradiance = Some(message);
        }
        TOPIC_WEATHER_FORECAST => {
            app_state.inputs.lock().await.weather.forecast_next_6h = Some(message);
        }
        _ => {}
    }

    Ok(())
}

async fn run_controller_pass(app_state: &AppState, message: Value) -> anyhow::Result<()> {
    let inputs = app_state.inputs.lock().await.clone();
    let now = now_in_timezone(app_state.timezone);

    let outcome = {
        let mut core = app_state.core.lock().await;
        let core = &mut *core;
        core.controller
            .process(&mut core.control, &message, &inputs, now)
    };

    let report = match outcome {
        PassOutcome::Skipped => {
            debug!("controller pass skipped by rate limit");
            return Ok(());
        }
        PassOutcome::Completed(report) => report,
    };

    log_notices(&report.notices);
    log_decision(&report);

    if let ElementCommand::SetElement(state) = report.command {
        app_state
            .mqtt
            .publish(TOPIC_CMD_ELEMENT, QoS::AtLeastOnce, false, state.payload())
            .await
            .context("failed to publish element command")?;
        app_state.core.lock().await.last_command = Some(CommandView {
            state,
            at_epoch_ms: now.timestamp_millis(),
        });
    }

    if let Some(record) = report.record {
        let body = serde_json::to_vec(&record).context("failed to serialize setpoint record")?;
        app_state
            .mqtt
            .publish(TOPIC_SETPOINT_LOG, QoS::AtLeastOnce, false, body)
            .await
            .context("failed to publish setpoint record")?;
        app_state.core.lock().await.last_record = Some(record);
    }

    Ok(())
}

fn log_notices(notices: &[Notice]) {
    for notice in notices {
        match notice {
            Notice::ControlModeChanged { from, to } => {
                info!("control state changed: {} -> {}", from.as_str(), to.as_str());
            }
            Notice::InconsistentAuthorityFlags => {
                warn!("energy management is active but auto control is not disabled");
            }
            Notice::InvalidSensorInput(err) => {
                warn!("ignoring tank reading: {err}");
            }
            Notice::WeatherReadFailed(err) => {
                warn!("weather state unreadable, assuming good solar: {err}");
            }
        }
    }
}

fn log_decision(report: &PassReport) {
    let thresholds = report.mode.thresholds;
    match &report.decision {
        SwitchDecision::TurnOn | SwitchDecision::TurnOff => {
            info!(
                "element {} (mode {}, off {:.1}, on {:.1}, s4 on {:.1})",
                if report.decision == SwitchDecision::TurnOn { "on" } else { "off" },
                report.mode.name,
                thresholds.switch_off_temp,
                thresholds.switch_on_temp,
                thresholds.switch_on_s4_temp,
            );
        }
        SwitchDecision::Vetoed {
            target,
            minutes_since_last_switch,
        } => {
            debug!(
                "switch {} vetoed: {minutes_since_last_switch:.1} min since last switch",
                target.as_str()
            );
        }
        SwitchDecision::Disabled | SwitchDecision::InvalidInput | SwitchDecision::Hold => {}
    }
}

async fn status_view(state: &AppState) -> StatusView {
    let inputs = state.inputs.lock().await.clone();
    let core = state.core.lock().await;
    StatusView {
        control_state: core.control.clone(),
        inputs,
        last_record: core.last_record.clone(),
        last_command: core.last_command.clone(),
        timezone: state.timezone.name().to_string(),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(status_view(&state).await)
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config: HwsConfig = state.core.lock().await.controller.config().clone();
    Json(config)
}

async fn handle_put_overrides(
    State(state): State<AppState>,
    Json(update): Json<OverridesUpdate>,
) -> impl IntoResponse {
    let mut inputs = state.inputs.lock().await;
    if let Some(value) = update.disable_auto_control {
        inputs.disable_auto_control = value;
    }
    if let Some(value) = update.hot_water_element {
        inputs.hot_water_element = value;
    }
    if let Some(value) = update.super_heat {
        inputs.super_heat = value;
    }
    if let Some(value) = update.energy_management_hws_active {
        inputs.energy_management_hws_active = value;
    }
    Json(inputs.clone())
}

async fn handle_put_weather(
    State(state): State<AppState>,
    Json(update): Json<WeatherUpdate>,
) -> axum::response::Response {
    if let Some(cloud) = update.cloud_cover {
        if !(0.0..=100.0).contains(&cloud) {
            return error_response(StatusCode::BAD_REQUEST, "cloud_cover must be 0..=100");
        }
    }
    if let Some(irradiance) = update.solar_irradiance {
        if !irradiance.is_finite() || irradiance < 0.0 {
            return error_response(StatusCode::BAD_REQUEST, "solar_irradiance must be >= 0");
        }
    }

    let mut inputs = state.inputs.lock().await;
    if let Some(cloud) = update.cloud_cover {
        inputs.weather.cloud_cover = Some(cloud.to_string());
    }
    if let Some(irradiance) = update.solar_irradiance {
        inputs.weather.solar_irradiance = Some(irradiance.to_string());
    }
    if let Some(forecast) = update.forecast_next_6h {
        inputs.weather.forecast_next_6h = Some(forecast);
    }
    Json(inputs.weather.clone()).into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HWS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hws"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn now_in_timezone(timezone: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&timezone);
    local.with_timezone(&local.offset().fix())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
