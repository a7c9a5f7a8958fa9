use bridge_api::{Codec, PluginError, Record};

/// JSON codec: UTF-8 текст, на верхнем уровне всегда объект.
///
/// Массив, число, строка и т.п. на верхнем уровне считается ошибкой формата, потому что
/// Record всегда набор именованных полей.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, payload: &[u8]) -> Result<Record, PluginError> {
        let s = std::str::from_utf8(payload)?;
        match serde_json::from_str::<serde_json::Value>(s)? {
            serde_json::Value::Object(fields) => Ok(Record::from(fields)),
            other => Err(PluginError::format_err(format!(
                "JSON codec: expected object, got {}",
                kind_of(&other)
            ))),
        }
    }

    fn encode(&self, record: &Record) -> Result<Vec<u8>, PluginError> {
        Ok(serde_json::to_vec(record)?)
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
