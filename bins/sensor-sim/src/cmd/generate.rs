use std::io::Write;

use bridge_api::{Codec, MessagePublisher};
use codec_json::JsonCodec;
use transport_mqtt::MqttPublisher;

use super::config::Effective;
use super::domain::{Rng, Sensor, new_sensors};
use super::error::SimError;

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(eff: &Effective) -> Result<(), SimError> {
    let mut rng = Rng::new(eff.seed);
    let sensors = new_sensors(eff.sensors, &mut rng);
    tracing::info!(sensors = sensors.len(), "virtual sensors created");

    let publisher = match &eff.mqtt {
        Some(mqtt) => {
            let p = MqttPublisher::connect(mqtt).await?;
            tracing::info!(broker = %mqtt.address(), topic = %mqtt.topic, "ready to publish");
            Some(p)
        }
        None => None,
    };
    let output: Option<&dyn MessagePublisher> = publisher.as_ref().map(|p| p as &dyn MessagePublisher);

    let result = tokio::select! {
        r = run_bursts(eff, &sensors, &mut rng, output) => r,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted by user");
            Ok(())
        }
    };

    if let Some(p) = &publisher {
        match p.disconnect().await {
            Ok(()) => tracing::info!("disconnected from mqtt broker"),
            Err(e) => tracing::warn!(error = %e, "mqtt disconnect failed"),
        }
    }
    result
}

// ═══════════════════════════════════════════════════════════════
//  Burst loop
// ═══════════════════════════════════════════════════════════════

/// Пачка: N случайных датчиков → JSON → publish (или stdout), пауза между пачками.
async fn run_bursts(
    eff: &Effective,
    sensors: &[Sensor],
    rng: &mut Rng,
    output: Option<&dyn MessagePublisher>,
) -> Result<(), SimError> {
    let codec = JsonCodec;
    let mut burst = 0u64;

    loop {
        burst += 1;
        tracing::info!(burst, messages = eff.messages_per_burst, "sending burst");

        for _ in 0..eff.messages_per_burst {
            let sensor = &sensors[rng.next_intn(sensors.len())];
            let reading = sensor.reading(rng, bridge_api::now_ms() / 1000);
            let payload = codec.encode(&reading)?;

            match output {
                Some(publisher) => publisher.publish(payload).await?,
                None => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(&payload)?;
                    out.write_all(b"\n")?;
                }
            }
            tokio::time::sleep(eff.delay_in_burst).await;
        }
        tracing::info!(burst, "burst sent");

        if eff.bursts > 0 && burst >= eff.bursts {
            return Ok(());
        }
        tokio::time::sleep(eff.delay_between_bursts).await;
    }
}
