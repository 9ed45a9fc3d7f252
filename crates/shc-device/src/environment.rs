use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Deployment environment of the device.
///
/// Selects the telemetry endpoint and reporting cadence. Only the two
/// tokens `dev` and `prod` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Environment {
    #[serde(rename = "dev")]
    Development,
    #[serde(rename = "prod")]
    Production,
}

impl Environment {
    /// Every recognized environment.
    pub const ALL: [Environment; 2] = [Environment::Development, Environment::Production];

    /// Stored and wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "dev",
            Environment::Production => "prod",
        }
    }

    /// Long name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| DeviceError::InvalidEnvironment(s.to_string()))
    }
}
