use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use shc_device::Environment;

use crate::error::TelemetryError;

/// Path of the telemetry socket on every endpoint.
pub const TELEMETRY_PATH: &str = "/shc/telemetria";

/// Development endpoint host.
pub const DEVELOPMENT_HOST: &str = "179.234.70.32:8081";

/// Production endpoint host.
pub const PRODUCTION_HOST: &str = "solutech.site";

/// Authority of a plain `ws://` telemetry endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
}

impl Endpoint {
    pub fn ws(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full socket URL.
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.host, TELEMETRY_PATH)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Parses `ws://host[:port]`. Any path is dropped; the telemetry path is
/// fixed. `wss://` is refused since the connector has no TLS stack.
impl FromStr for Endpoint {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TelemetryError::InvalidEndpoint(s.to_string());
        let (scheme, rest) = s.split_once("://").ok_or_else(invalid)?;
        match scheme {
            "ws" => {}
            "wss" => return Err(TelemetryError::TlsUnsupported(s.to_string())),
            _ => return Err(invalid()),
        }
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(Self::ws(host))
    }
}

/// Maps the stored environment to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTable {
    entries: BTreeMap<Environment, Endpoint>,
    fallback: Option<Endpoint>,
}

impl Default for EndpointTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Environment::Development, Endpoint::ws(DEVELOPMENT_HOST));
        entries.insert(Environment::Production, Endpoint::ws(PRODUCTION_HOST));
        Self {
            entries,
            fallback: None,
        }
    }
}

impl EndpointTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback: None,
        }
    }

    pub fn with(mut self, environment: Environment, endpoint: Endpoint) -> Self {
        self.entries.insert(environment, endpoint);
        self
    }

    /// Endpoint used while no environment is provisioned.
    pub fn with_fallback(mut self, endpoint: Endpoint) -> Self {
        self.fallback = Some(endpoint);
        self
    }

    pub fn resolve(&self, environment: Option<Environment>) -> Option<&Endpoint> {
        match environment {
            Some(env) => self.entries.get(&env),
            None => self.fallback.as_ref(),
        }
    }
}

/// Send interval per environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceTable {
    pub development: Duration,
    pub production: Duration,
    pub unset: Duration,
}

impl Default for CadenceTable {
    fn default() -> Self {
        Self {
            development: Duration::from_secs(5),
            production: Duration::from_secs(60),
            unset: Duration::from_secs(15),
        }
    }
}

impl CadenceTable {
    pub fn interval(&self, environment: Option<Environment>) -> Duration {
        match environment {
            Some(Environment::Development) => self.development,
            Some(Environment::Production) => self.production,
            None => self.unset,
        }
    }
}
