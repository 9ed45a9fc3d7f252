use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One telemetry report. Built fresh on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    /// Empty when the device has not been provisioned.
    pub identifier: String,
    /// Empty when the device has not been provisioned.
    pub correlation_id: String,
    /// Degrees Celsius; `0.0` when the sensor could not be read.
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
