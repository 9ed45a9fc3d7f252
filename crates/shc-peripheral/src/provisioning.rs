use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use shc_device::{Environment, ProvisioningStore, StoreKey};

use crate::error::{PeripheralError, Result};

/// Value reported for a slot that has never been written.
pub const UNDEFINED: &str = "undefined";

/// Provisioning slots exposed as read/write characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Free-form device name. Write-once.
    Identifier,
    /// Backend correlation UUID. Write-once.
    CorrelationId,
    /// Deployment environment (`dev` / `prod`).
    Environment,
    /// Static IPv4 address.
    NetworkAddress,
}

impl Slot {
    pub const ALL: [Slot; 4] = [
        Slot::Identifier,
        Slot::CorrelationId,
        Slot::Environment,
        Slot::NetworkAddress,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Slot::Identifier => "identifier",
            Slot::CorrelationId => "correlation-id",
            Slot::Environment => "environment",
            Slot::NetworkAddress => "network-address",
        }
    }

    pub fn key(self) -> StoreKey {
        match self {
            Slot::Identifier => StoreKey::Identifier,
            Slot::CorrelationId => StoreKey::CorrelationId,
            Slot::Environment => StoreKey::Environment,
            Slot::NetworkAddress => StoreKey::NetworkAddress,
        }
    }

    /// Write-once slots keep their first non-empty value.
    pub fn is_write_once(self) -> bool {
        matches!(self, Slot::Identifier | Slot::CorrelationId)
    }

    /// Validate a raw written value and return its stored form.
    pub fn normalize(self, raw: &[u8]) -> Result<String> {
        let invalid = |reason: &str| PeripheralError::InvalidValue {
            slot: self.name(),
            reason: reason.to_string(),
        };
        let text = std::str::from_utf8(raw).map_err(|_| invalid("not valid UTF-8"))?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

        match self {
            Slot::Identifier => {
                if text.is_empty() {
                    return Err(invalid("must not be empty"));
                }
                Ok(text.to_string())
            }
            Slot::CorrelationId => uuid::Uuid::parse_str(text)
                .map(|id| id.hyphenated().to_string())
                .map_err(|_| invalid("not a UUID")),
            Slot::Environment => text
                .parse::<Environment>()
                .map(|env| env.as_str().to_string())
                .map_err(|err| invalid(&err.to_string())),
            Slot::NetworkAddress => text
                .parse::<Ipv4Addr>()
                .map(|addr| addr.to_string())
                .map_err(|_| invalid("not an IPv4 address")),
        }
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Slot::ALL
            .into_iter()
            .find(|slot| slot.name() == s)
            .ok_or_else(|| format!("unknown slot '{s}'"))
    }
}

/// Result of an accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored (or the trigger was applied).
    Stored,
    /// The slot is write-once and already provisioned; nothing changed.
    Ignored,
}

/// Provisioning record streamed on the device channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub identifier: String,
    pub correlation_id: String,
    pub environment: String,
}

/// Read/write access to provisioning slots backed by a store.
#[derive(Clone)]
pub struct ProvisioningSlots {
    store: Arc<dyn ProvisioningStore>,
}

impl ProvisioningSlots {
    pub fn new(store: Arc<dyn ProvisioningStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ProvisioningStore> {
        &self.store
    }

    /// Current value, or [`UNDEFINED`]. Never fails: store errors are
    /// logged and reported as unset.
    pub fn read(&self, slot: Slot) -> String {
        match self.store.get(slot.key()) {
            Ok(Some(value)) => value,
            Ok(None) => UNDEFINED.to_string(),
            Err(err) => {
                warn!(slot = slot.name(), error = %err, "store read failed");
                UNDEFINED.to_string()
            }
        }
    }

    /// Validate and store a value.
    ///
    /// Invalid values are rejected before the store is touched. Writes to
    /// an already-provisioned write-once slot are ignored.
    pub fn write(&self, slot: Slot, raw: &[u8]) -> Result<WriteOutcome> {
        let value = slot.normalize(raw)?;

        if slot.is_write_once() {
            if self.store.set_if_empty(slot.key(), &value)? {
                info!(slot = slot.name(), "provisioned");
                Ok(WriteOutcome::Stored)
            } else {
                warn!(slot = slot.name(), "already provisioned; write ignored");
                Ok(WriteOutcome::Ignored)
            }
        } else {
            self.store.set(slot.key(), &value)?;
            info!(slot = slot.name(), value = %value, "updated");
            Ok(WriteOutcome::Stored)
        }
    }

    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            identifier: self.read(Slot::Identifier),
            correlation_id: self.read(Slot::CorrelationId),
            environment: self.read(Slot::Environment),
        }
    }
}
