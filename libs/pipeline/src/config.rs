use std::time::Duration;

use serde::Deserialize;

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Flush Config
// ═══════════════════════════════════════════════════════════════

/// Параметры flush task'а. Задаются один раз при старте и не меняются.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlushConfig {
    /// Интервал между попытками drain (мс).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Выполнить последний flush при graceful shutdown.
    #[serde(default = "default_final_flush")]
    pub final_flush: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            final_flush: default_final_flush(),
        }
    }
}

impl FlushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.interval_ms == 0 {
            return Err(PipelineError::InvalidConfig("interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

fn default_interval_ms() -> u64 {
    3000
}
fn default_final_flush() -> bool {
    true
}
