use bridge_api::mask_uri_credentials;

use crate::config::{BridgeArgs, Settings};
use crate::error::BridgeError;

/// Проверить настройки без подключения и вывести итог.
pub fn run(args: BridgeArgs) -> Result<(), BridgeError> {
    let s = Settings::resolve(&args)?;

    println!("telemetry-bridge settings");
    println!("  storage        : {}", s.storage);
    match &s.mongo {
        Some(mongo) => {
            println!("  mongo uri      : {}", mask_uri_credentials(&mongo.uri));
            println!("  mongo target   : {}.{}", mongo.database, mongo.collection);
        }
        None => println!("  memory records : {}", s.memory.max_records),
    }
    println!("  mqtt broker    : {}", s.mqtt.address());
    println!("  mqtt topic     : {}", s.mqtt.topic);
    println!("  mqtt client id : {}", s.mqtt.client_id);
    println!("  keep-alive     : {} s", s.mqtt.keep_alive_secs);
    println!("  qos            : {}", s.mqtt.qos);
    match s.mqtt.max_reconnects {
        0 => println!("  reconnects     : unlimited"),
        n => println!("  reconnects     : {n}"),
    }
    println!("  flush interval : {} ms", s.flush.interval_ms);
    println!("  final flush    : {}", if s.flush.final_flush { "yes" } else { "no" });
    println!("  shutdown grace : {} ms", s.shutdown_grace.as_millis());
    Ok(())
}
