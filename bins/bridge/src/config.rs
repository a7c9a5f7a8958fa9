use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use pipeline::config::FlushConfig;
use storage_memory::MemoryStorageConfig;
use storage_mongodb::MongoStorageConfig;
use transport_mqtt::{MqttConfig, parse_broker_address};

use crate::error::BridgeError;

const DEFAULT_CONFIG_PATH: &str = "bridge.toml";

#[derive(Parser)]
#[command(name = "telemetry-bridge", about = "MQTT → MongoDB мост телеметрии")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить bridge
    Run(BridgeArgs),
    /// Проверить настройки и вывести итоговую конфигурацию (без подключения)
    Check(BridgeArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct BridgeArgs {
    /// Путь к TOML конфиг файлу (по умолчанию bridge.toml, если существует)
    #[arg(long, env = "BRIDGE_CONFIG")]
    pub config: Option<String>,

    /// MongoDB connection string
    #[arg(long, env = "MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,

    #[arg(long, env = "MONGO_DATABASE")]
    pub mongo_database: Option<String>,

    #[arg(long, env = "MONGO_COLLECTION")]
    pub mongo_collection: Option<String>,

    /// Адрес брокера: host или host:port
    #[arg(long, env = "MQTT_HOST")]
    pub mqtt_host: Option<String>,

    /// Порт брокера (перекрывает порт из MQTT_HOST)
    #[arg(long, env = "MQTT_PORT")]
    pub mqtt_port: Option<u16>,

    #[arg(long, env = "MQTT_TOPIC")]
    pub mqtt_topic: Option<String>,

    /// MQTT client id (по умолчанию telemetry-bridge-<pid>)
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "MQTT_KEEPALIVE")]
    pub keep_alive_secs: Option<u64>,

    /// QoS подписки: 0, 1 или 2
    #[arg(long, env = "MQTT_QOS")]
    pub qos: Option<u8>,

    /// Максимум подряд неудачных переподключений (0 = без ограничения)
    #[arg(long, env = "MQTT_MAX_RECONNECTS")]
    pub max_reconnects: Option<u32>,

    /// Интервал flush'а в мс
    #[arg(long, env = "FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: Option<u64>,

    /// Куда писать batch'и
    #[arg(long, value_enum, env = "BRIDGE_STORAGE")]
    pub storage: Option<StorageKind>,

    /// Не выполнять финальный flush при остановке
    #[arg(long)]
    pub no_final_flush: bool,

    /// Сколько ждать остановки task'ов перед abort (мс)
    #[arg(long, env = "SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Mongodb,
    Memory,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mongodb => f.write_str("mongodb"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub storage: Option<StorageKind>,
    pub shutdown_grace_ms: Option<u64>,
    #[serde(default)]
    pub mongo: FileMongo,
    #[serde(default)]
    pub mqtt: FileMqtt,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub memory: MemoryStorageConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMongo {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMqtt {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub topic: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub qos: Option<u8>,
    pub max_reconnects: Option<u32>,
    pub max_packet_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    /// Явно указанный файл обязан существовать; bridge.toml по умолчанию может отсутствовать.
    pub fn load_for(args: &BridgeArgs) -> Result<Self, BridgeError> {
        match &args.config {
            Some(path) => Self::load(path),
            None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Settings: merged config (file < env/CLI)
// ═══════════════════════════════════════════════════════════════

pub struct Settings {
    pub storage: StorageKind,
    /// `None` только для `storage = memory`.
    pub mongo: Option<MongoStorageConfig>,
    pub memory: MemoryStorageConfig,
    pub mqtt: MqttConfig,
    pub flush: FlushConfig,
    pub shutdown_grace: Duration,
}

/// Непустое значение: CLI/env, иначе файл. Пустая строка с любой стороны не считается значением.
fn pick(arg: &Option<String>, file: Option<String>) -> Option<String> {
    let non_blank = |v: String| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    };
    arg.clone().and_then(non_blank).or_else(|| file.and_then(non_blank))
}

impl Settings {
    pub fn resolve(args: &BridgeArgs) -> Result<Self, BridgeError> {
        Self::merge(args, FileConfig::load_for(args)?)
    }

    /// Все обязательные настройки проверяются до любого подключения;
    /// ошибка перечисляет каждую отсутствующую переменную.
    pub fn merge(args: &BridgeArgs, file: FileConfig) -> Result<Self, BridgeError> {
        let storage = args.storage.or(file.storage).unwrap_or_default();

        let uri = pick(&args.mongo_uri, file.mongo.uri);
        let database = pick(&args.mongo_database, file.mongo.database);
        let collection = pick(&args.mongo_collection, file.mongo.collection);
        let host = pick(&args.mqtt_host, file.mqtt.host);
        let topic = pick(&args.mqtt_topic, file.mqtt.topic);

        let mut missing = Vec::new();
        if storage == StorageKind::Mongodb {
            if uri.is_none() {
                missing.push("MONGO_URI");
            }
            if database.is_none() {
                missing.push("MONGO_DATABASE");
            }
            if collection.is_none() {
                missing.push("MONGO_COLLECTION");
            }
        }
        if host.is_none() {
            missing.push("MQTT_HOST");
        }
        if topic.is_none() {
            missing.push("MQTT_TOPIC");
        }

        let (Some(host), Some(topic)) = (host, topic) else {
            return Err(BridgeError::MissingSettings(missing));
        };
        let mongo = match (storage, uri, database, collection) {
            (StorageKind::Memory, ..) => None,
            (StorageKind::Mongodb, Some(uri), Some(database), Some(collection)) => {
                Some(MongoStorageConfig::new(uri, database, collection))
            }
            _ => return Err(BridgeError::MissingSettings(missing)),
        };

        let (host, port) = parse_broker_address(&host, args.mqtt_port.or(file.mqtt.port))?;
        let client_id = pick(&args.client_id, file.mqtt.client_id)
            .unwrap_or_else(|| format!("telemetry-bridge-{}", std::process::id()));

        let mut mqtt = MqttConfig::new(host, port, topic, client_id);
        if let Some(secs) = args.keep_alive_secs.or(file.mqtt.keep_alive_secs) {
            mqtt.keep_alive_secs = secs;
        }
        mqtt.qos = args.qos.or(file.mqtt.qos).unwrap_or(0);
        mqtt.max_reconnects = args.max_reconnects.or(file.mqtt.max_reconnects).unwrap_or(0);
        if let Some(bytes) = file.mqtt.max_packet_bytes {
            mqtt.max_packet_bytes = bytes;
        }
        mqtt.validate()?;

        let mut flush = file.flush;
        if let Some(ms) = args.flush_interval_ms {
            flush.interval_ms = ms;
        }
        flush.final_flush = flush.final_flush && !args.no_final_flush;
        flush.validate()?;

        Ok(Self {
            storage,
            mongo,
            memory: file.memory,
            mqtt,
            flush,
            shutdown_grace: Duration::from_millis(args.shutdown_grace_ms.or(file.shutdown_grace_ms).unwrap_or(5000)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_args() -> BridgeArgs {
        BridgeArgs {
            mongo_uri: Some("mongodb://admin:pw@db:27017".into()),
            mongo_database: Some("telemetry".into()),
            mongo_collection: Some("readings".into()),
            mqtt_host: Some("broker".into()),
            mqtt_topic: Some("sensors/data".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let s = Settings::merge(&full_args(), FileConfig::default()).unwrap();
        assert_eq!(s.storage, StorageKind::Mongodb);
        assert_eq!(s.mqtt.port, 1883);
        assert_eq!(s.mqtt.keep_alive_secs, 60);
        assert_eq!(s.mqtt.qos, 0);
        assert!(s.mqtt.client_id.starts_with("telemetry-bridge-"));
        assert_eq!(s.flush.interval(), Duration::from_secs(3));
        assert!(s.flush.final_flush);
        assert_eq!(s.shutdown_grace, Duration::from_secs(5));
        assert_eq!(s.mongo.unwrap().collection, "readings");
    }

    #[test]
    fn every_missing_setting_is_named() {
        let args = BridgeArgs {
            mongo_uri: Some("mongodb://db".into()),
            mqtt_topic: Some("   ".into()),
            ..Default::default()
        };
        let err = Settings::merge(&args, FileConfig::default()).err().unwrap();
        match err {
            BridgeError::MissingSettings(names) => {
                assert_eq!(names, vec!["MONGO_DATABASE", "MONGO_COLLECTION", "MQTT_HOST", "MQTT_TOPIC"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn memory_storage_does_not_need_mongo() {
        let args = BridgeArgs {
            mqtt_host: Some("broker:1884".into()),
            mqtt_topic: Some("t".into()),
            storage: Some(StorageKind::Memory),
            ..Default::default()
        };
        let s = Settings::merge(&args, FileConfig::default()).unwrap();
        assert!(s.mongo.is_none());
        assert_eq!(s.mqtt.port, 1884);
    }

    #[test]
    fn cli_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            shutdown_grace_ms = 1000

            [mqtt]
            host = "file-broker"
            port = 2000
            qos = 1

            [flush]
            interval_ms = 500
            "#,
        )
        .unwrap();
        let args = BridgeArgs {
            mqtt_port: Some(3000),
            flush_interval_ms: Some(750),
            no_final_flush: true,
            ..full_args()
        };
        let s = Settings::merge(&args, file).unwrap();
        assert_eq!(s.mqtt.host, "broker");
        assert_eq!(s.mqtt.port, 3000);
        assert_eq!(s.mqtt.qos, 1);
        assert_eq!(s.flush.interval_ms, 750);
        assert!(!s.flush.final_flush);
        assert_eq!(s.shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = BridgeArgs { qos: Some(3), ..full_args() };
        assert!(matches!(Settings::merge(&args, FileConfig::default()), Err(BridgeError::Plugin(_))));

        let args = BridgeArgs { flush_interval_ms: Some(0), ..full_args() };
        assert!(matches!(Settings::merge(&args, FileConfig::default()), Err(BridgeError::Pipeline(_))));
    }

    #[test]
    fn blank_env_value_falls_back_to_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [mongo]
            uri = "mongodb://file-db:27017"
            "#,
        )
        .unwrap();
        let args = BridgeArgs {
            mongo_uri: Some("".into()),
            ..full_args()
        };
        let s = Settings::merge(&args, file).unwrap();
        assert_eq!(s.mongo.unwrap().uri, "mongodb://file-db:27017");
    }

    #[test]
    fn packet_limit_comes_from_file() {
        let file: FileConfig = toml::from_str("[mqtt]\nmax_packet_bytes = 1048576").unwrap();
        let s = Settings::merge(&full_args(), file).unwrap();
        assert_eq!(s.mqtt.max_packet_bytes, 1_048_576);
    }

    #[test]
    fn unknown_file_keys_fail_to_parse() {
        assert!(toml::from_str::<FileConfig>("[mqtt]\nhots = \"x\"").is_err());
    }
}
