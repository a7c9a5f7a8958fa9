use std::time::Duration;

use bridge_api::PluginError;
use rumqttc::QoS;

pub const DEFAULT_PORT: u16 = 1883;

/// Максимальная длина пакета по протоколу MQTT (remaining length 268 435 455 + заголовок).
pub const MAX_PACKET_BYTES: usize = 268_435_460;

/// Параметры соединения с MQTT брокером.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// QoS подписки/публикации: 0, 1 или 2.
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Максимум подряд неудачных переподключений (0 = без ограничения).
    #[serde(default)]
    pub max_reconnects: u32,
    /// Лимит размера входящего/исходящего пакета.
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_max_packet_bytes() -> usize {
    MAX_PACKET_BYTES
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
            client_id: client_id.into(),
            keep_alive_secs: default_keep_alive_secs(),
            qos: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            max_reconnects: 0,
            max_packet_bytes: default_max_packet_bytes(),
        }
    }

    pub fn validate(&self) -> Result<(), PluginError> {
        if self.host.trim().is_empty() {
            return Err(PluginError::config("mqtt: host is empty"));
        }
        if self.topic.trim().is_empty() {
            return Err(PluginError::config("mqtt: topic is empty"));
        }
        if self.keep_alive_secs < 5 {
            return Err(PluginError::config("mqtt: keep_alive_secs must be >= 5"));
        }
        parse_qos(self.qos)?;
        if self.max_packet_bytes == 0 {
            return Err(PluginError::config("mqtt: max_packet_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn options(&self) -> rumqttc::MqttOptions {
        let mut options = rumqttc::MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(true);
        options.set_max_packet_size(self.max_packet_bytes, self.max_packet_bytes);
        options
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

pub fn parse_qos(qos: u8) -> Result<QoS, PluginError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(PluginError::config(format!("mqtt: invalid qos {other}, expected 0, 1 or 2"))),
    }
}

/// Разобрать адрес брокера: `host` или `host:port`.
///
/// `explicit_port` (из MQTT_PORT / --mqtt-port) перекрывает порт из адреса.
pub fn parse_broker_address(addr: &str, explicit_port: Option<u16>) -> Result<(String, u16), PluginError> {
    let addr = addr.trim();
    let addr = addr
        .strip_prefix("mqtt://")
        .or_else(|| addr.strip_prefix("tcp://"))
        .unwrap_or(addr);
    if addr.is_empty() {
        return Err(PluginError::config("mqtt: broker address is empty"));
    }

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port: u16 = port
                .parse()
                .map_err(|_| PluginError::config(format!("mqtt: bad port in '{addr}'")))?;
            (host, port)
        }
        _ => (addr, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(PluginError::config(format!("mqtt: missing host in '{addr}'")));
    }
    Ok((host.to_string(), explicit_port.unwrap_or(port)))
}

/// Задержка перед повторной попыткой: base * 2^(attempt-1), не больше max.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(max)
}
