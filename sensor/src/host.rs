use std::time::{Duration, Instant};

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use tracing::{info, warn};

use hws_common::{TOPIC_SENSOR_STATUS, TOPIC_SENSOR_TANK};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let period_secs = std::env::var("SENSOR_PERIOD_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(30);

    let mut mqtt_options = MqttOptions::new("hws-sensor", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("tank sensor simulator started, publishing every {period_secs}s");

    let started = Instant::now();
    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(period_secs));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        // Simulated stratified tank: the middle layer drifts through the
        // switching band so the controller has something to do.
        let phase = (tick % 40) as f32;
        let ramp = if phase < 20.0 { phase } else { 40.0 - phase };
        let s3 = 26.0 + ramp * 0.6;
        let s2 = s3 - 6.0;
        let s4 = s3 + 8.0;

        let payload = json!({
            "s2": round1(s2),
            "s3": round1(s3),
            "s4": round1(s4),
            "time": started.elapsed().as_secs(),
        });

        mqtt.publish(TOPIC_SENSOR_TANK, QoS::AtLeastOnce, false, payload.to_string())
            .await
            .context("failed to publish tank reading")?;
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
