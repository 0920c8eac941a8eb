//! Entity platforms an integration can forward its entries to

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity platform (homeassistant.const.Platform)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Sensor,
    Tts,
}

impl Platform {
    /// The entity domain entities of this platform live under
    pub fn domain(&self) -> &'static str {
        match self {
            Platform::Sensor => "sensor",
            Platform::Tts => "tts",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.domain())
    }
}
