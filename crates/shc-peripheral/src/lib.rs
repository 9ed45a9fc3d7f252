//! Radio peripheral service.
//!
//! Each streaming channel pairs a trigger characteristic with a notify
//! characteristic. A one-byte `y` written to the trigger opens the channel's
//! [`RequestGate`]; the channel's producer task then collects one payload,
//! streams it in frames no larger than the characteristic allows, signals
//! end-of-stream, and closes the gate again. Provisioning slots are plain
//! read / write characteristics backed by the device store.
//!
//! The radio stack itself lives in a separate daemon. [`RelayServer`]
//! exposes the [`PeripheralService`] to it over the local relay socket.

pub mod characteristic;
pub mod collect;
pub mod error;
pub mod gate;
pub mod notifier;
pub mod provisioning;
pub mod relay;
pub mod service;

pub use characteristic::{
    ChannelConfig, CycleOutcome, EmptyResultPolicy, StreamState, StreamingCharacteristic,
};
pub use collect::{
    Collected, DeviceRecordCollector, NetworkListCollector, PayloadCollector,
    TemperatureCollector,
};
pub use error::{att, PeripheralError, Result};
pub use gate::{is_start_command, GateClaim, RequestGate, START_SENTINEL};
pub use notifier::Notifier;
pub use provisioning::{DeviceRecord, ProvisioningSlots, Slot, WriteOutcome, UNDEFINED};
pub use relay::{serve_connection, RelayServer};
pub use service::{
    CharacteristicDescriptor, PeripheralService, ServiceBuilder, ServiceDescriptor, FIRST_HANDLE,
    LOCAL_NAME, SERVICE_UUID,
};
