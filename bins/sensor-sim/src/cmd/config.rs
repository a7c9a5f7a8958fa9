use std::time::Duration;

use clap::Args;
use serde::Deserialize;

use transport_mqtt::{MqttConfig, parse_broker_address};

use super::error::SimError;

const DEFAULT_CONFIG_PATH: &str = "sensor-sim.toml";

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub mqtt_host: Option<String>,
    pub mqtt_port: Option<u16>,
    pub mqtt_topic: Option<String>,
    pub client_id: Option<String>,
    pub qos: Option<u8>,
    pub sensors: Option<usize>,
    pub messages_per_burst: Option<usize>,
    pub delay_between_bursts: Option<f64>,
    pub delay_in_burst: Option<f64>,
    pub seed: Option<i64>,
    pub bursts: Option<u64>,
}

pub fn load_config(path: &str) -> Result<Config, SimError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| SimError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| SimError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct SimArgs {
    /// Путь к TOML конфигу (по умолчанию sensor-sim.toml, если существует)
    #[arg(long, env = "SIM_CONFIG")]
    pub config: Option<String>,

    /// Адрес брокера: host или host:port
    #[arg(long, env = "MQTT_HOST")]
    pub mqtt_host: Option<String>,

    #[arg(long, env = "MQTT_PORT")]
    pub mqtt_port: Option<u16>,

    #[arg(long, env = "MQTT_TOPIC")]
    pub mqtt_topic: Option<String>,

    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "MQTT_QOS")]
    pub qos: Option<u8>,

    /// Количество виртуальных датчиков
    #[arg(long, env = "TOTAL_VIRTUAL_SENSORS")]
    pub sensors: Option<usize>,

    /// Сообщений в одной пачке
    #[arg(long, env = "MESSAGES_PER_BURST")]
    pub messages_per_burst: Option<usize>,

    /// Пауза между пачками, секунды
    #[arg(long, env = "DELAY_BETWEEN_BURSTS")]
    pub delay_between_bursts: Option<f64>,

    /// Пауза между сообщениями внутри пачки, секунды
    #[arg(long, env = "DELAY_IN_BURST")]
    pub delay_in_burst: Option<f64>,

    /// Seed для PRNG (0 = текущее время)
    #[arg(long)]
    pub seed: Option<i64>,

    /// Сколько пачек отправить (0 = бесконечно)
    #[arg(long)]
    pub bursts: Option<u64>,

    /// Печатать JSON в stdout вместо публикации
    #[arg(long)]
    pub dry_run: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config.toml < env/CLI
pub struct Effective {
    /// `None` в режиме `--dry-run`.
    pub mqtt: Option<MqttConfig>,
    pub sensors: usize,
    pub messages_per_burst: usize,
    pub delay_between_bursts: Duration,
    pub delay_in_burst: Duration,
    pub seed: i64,
    pub bursts: u64,
}

fn seconds(name: &str, value: f64) -> Result<Duration, SimError> {
    Duration::try_from_secs_f64(value).map_err(|_| SimError::Config(format!("{name} must be a non-negative number of seconds, got {value}")))
}

impl Effective {
    pub fn new(args: &SimArgs) -> Result<Self, SimError> {
        let cfg = match &args.config {
            Some(path) => load_config(path)?,
            None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH)?,
            None => Config::default(),
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &SimArgs, cfg: Config) -> Result<Self, SimError> {
        let sensors = args.sensors.or(cfg.sensors).unwrap_or(10);
        if sensors == 0 {
            return Err(SimError::Config("TOTAL_VIRTUAL_SENSORS must be > 0".into()));
        }

        let mqtt = if args.dry_run {
            None
        } else {
            let host = args
                .mqtt_host
                .clone()
                .or(cfg.mqtt_host)
                .ok_or_else(|| SimError::Config("MQTT_HOST is not set".into()))?;
            let topic = args
                .mqtt_topic
                .clone()
                .or(cfg.mqtt_topic)
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| SimError::Config("MQTT_TOPIC is not set".into()))?;
            let (host, port) = parse_broker_address(&host, args.mqtt_port.or(cfg.mqtt_port))?;
            let client_id = args
                .client_id
                .clone()
                .or(cfg.client_id)
                .unwrap_or_else(|| format!("sensor-sim-{}", std::process::id()));

            let mut mqtt = MqttConfig::new(host, port, topic, client_id);
            mqtt.qos = args.qos.or(cfg.qos).unwrap_or(0);
            mqtt.validate()?;
            Some(mqtt)
        };

        Ok(Self {
            mqtt,
            sensors,
            messages_per_burst: args.messages_per_burst.or(cfg.messages_per_burst).unwrap_or(20),
            delay_between_bursts: seconds(
                "DELAY_BETWEEN_BURSTS",
                args.delay_between_bursts.or(cfg.delay_between_bursts).unwrap_or(5.0),
            )?,
            delay_in_burst: seconds("DELAY_IN_BURST", args.delay_in_burst.or(cfg.delay_in_burst).unwrap_or(0.1))?,
            seed: args.seed.or(cfg.seed).unwrap_or(0),
            bursts: args.bursts.or(cfg.bursts).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_needs_no_broker() {
        let args = SimArgs { dry_run: true, ..Default::default() };
        let eff = Effective::merge(&args, Config::default()).unwrap();
        assert!(eff.mqtt.is_none());
        assert_eq!(eff.sensors, 10);
        assert_eq!(eff.messages_per_burst, 20);
        assert_eq!(eff.delay_between_bursts, Duration::from_secs(5));
        assert_eq!(eff.delay_in_burst, Duration::from_millis(100));
        assert_eq!(eff.bursts, 0);
    }

    #[test]
    fn publishing_requires_host_and_topic() {
        let args = SimArgs { mqtt_host: Some("broker".into()), ..Default::default() };
        assert!(matches!(Effective::merge(&args, Config::default()), Err(SimError::Config(_))));
    }

    #[test]
    fn args_override_file() {
        let cfg: Config = toml::from_str(
            r#"
            mqtt_host = "file-broker:1999"
            mqtt_topic = "sensors/data"
            sensors = 3
            delay_in_burst = 0.5
            "#,
        )
        .unwrap();
        let args = SimArgs {
            mqtt_port: Some(1884),
            sensors: Some(7),
            ..Default::default()
        };
        let eff = Effective::merge(&args, cfg).unwrap();
        let mqtt = eff.mqtt.unwrap();
        assert_eq!(mqtt.host, "file-broker");
        assert_eq!(mqtt.port, 1884);
        assert_eq!(eff.sensors, 7);
        assert_eq!(eff.delay_in_burst, Duration::from_millis(500));
    }

    #[test]
    fn negative_delay_is_rejected() {
        let args = SimArgs {
            dry_run: true,
            delay_between_bursts: Some(-1.0),
            ..Default::default()
        };
        assert!(Effective::merge(&args, Config::default()).is_err());
    }
}
