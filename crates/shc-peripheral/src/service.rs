use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::{uuid, Uuid};

use shc_device::{NetworkScanner, ProvisioningStore, SensorSource};
use shc_frame::{COMPACT_FRAME_SIZE, STANDARD_FRAME_SIZE};

use crate::characteristic::{ChannelConfig, StreamingCharacteristic};
use crate::collect::{DeviceRecordCollector, NetworkListCollector, TemperatureCollector};
use crate::error::{PeripheralError, Result};
use crate::notifier::Notifier;
use crate::provisioning::{ProvisioningSlots, Slot, WriteOutcome};

/// Automation IO service (16-bit UUID 0x1815).
pub const SERVICE_UUID: Uuid = uuid!("00001815-0000-1000-8000-00805f9b34fb");

/// Advertised local name.
pub const LOCAL_NAME: &str = "Solutech Home Connect";

/// Handle of the first registered attribute.
pub const FIRST_HANDLE: u16 = 0x0010;

pub const NETWORKS_TRIGGER_UUID: Uuid = uuid!("351e784a-4099-405e-8031-e4b473e668a4");
pub const NETWORKS_NOTIFY_UUID: Uuid = uuid!("34a97fc8-5118-4484-b022-0c8a467cd533");
pub const TEMPERATURE_TRIGGER_UUID: Uuid = uuid!("51aafba2-2d8b-48de-84a1-1d5746af5447");
pub const TEMPERATURE_NOTIFY_UUID: Uuid = uuid!("aee5af4f-d1a8-4855-b770-b912519327d6");
pub const DEVICE_TRIGGER_UUID: Uuid = uuid!("88a00f38-6ee8-4e79-8302-855c9a6edac6");
pub const DEVICE_NOTIFY_UUID: Uuid = uuid!("4780e126-f320-4583-b2fd-dc9419e88aaf");

/// Read and write characteristic UUIDs for a provisioning slot.
pub fn slot_uuids(slot: Slot) -> (Uuid, Uuid) {
    match slot {
        Slot::Identifier => (
            uuid!("55cc9c0d-d42d-4f0f-850c-00b1809007e7"),
            uuid!("cde083d8-b20c-4709-b756-2f219a911994"),
        ),
        Slot::CorrelationId => (
            uuid!("061e21d7-75bd-48fe-b0d5-b6237ef833c7"),
            uuid!("ecb2b207-78ab-44e1-a55e-dab0c6d4bf73"),
        ),
        Slot::Environment => (
            uuid!("ff39ae7e-61b6-4f67-af74-324e7af948bd"),
            uuid!("2f54b94a-a6fe-4d5f-a4ca-932a362eba10"),
        ),
        Slot::NetworkAddress => (
            uuid!("02e9a221-8643-451e-ad92-deeec489c44b"),
            uuid!("92e6b940-1ed5-43fb-b942-6ac51ad5d72d"),
        ),
    }
}

#[derive(Clone)]
enum Attribute {
    Trigger(Arc<StreamingCharacteristic>),
    Stream(Arc<StreamingCharacteristic>),
    SlotRead(Slot),
    SlotWrite(Slot),
}

impl Attribute {
    fn properties(&self) -> &'static [&'static str] {
        match self {
            Attribute::Trigger(_) | Attribute::SlotWrite(_) => &["write"],
            Attribute::Stream(_) => &["notify"],
            Attribute::SlotRead(_) => &["read"],
        }
    }
}

struct Entry {
    name: String,
    uuid: Uuid,
    attribute: Attribute,
}

/// Service table entry as sent to the radio daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicDescriptor {
    pub handle: u16,
    pub name: String,
    pub uuid: String,
    pub properties: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<usize>,
}

/// Full service table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub uuid: String,
    pub local_name: String,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// Builds a [`PeripheralService`], assigning handles in registration order.
pub struct ServiceBuilder {
    slots: ProvisioningSlots,
    entries: BTreeMap<u16, Entry>,
    channels: Vec<Arc<StreamingCharacteristic>>,
    next_handle: u16,
}

impl ServiceBuilder {
    fn push(&mut self, name: String, uuid: Uuid, attribute: Attribute) -> u16 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.entries.insert(
            handle,
            Entry {
                name,
                uuid,
                attribute,
            },
        );
        handle
    }

    /// Register a streaming channel as a trigger + notify pair.
    pub fn channel(
        mut self,
        channel: StreamingCharacteristic,
        trigger_uuid: Uuid,
        notify_uuid: Uuid,
    ) -> Self {
        let channel = Arc::new(channel);
        let name = channel.name().to_string();
        self.push(
            format!("{name}-trigger"),
            trigger_uuid,
            Attribute::Trigger(channel.clone()),
        );
        self.push(name, notify_uuid, Attribute::Stream(channel.clone()));
        self.channels.push(channel);
        self
    }

    /// Register a provisioning slot as a read + write pair.
    pub fn slot(mut self, slot: Slot) -> Self {
        let (read_uuid, write_uuid) = slot_uuids(slot);
        self.push(slot.name().to_string(), read_uuid, Attribute::SlotRead(slot));
        self.push(
            format!("{}-write", slot.name()),
            write_uuid,
            Attribute::SlotWrite(slot),
        );
        self
    }

    pub fn build(self) -> PeripheralService {
        PeripheralService {
            slots: self.slots,
            entries: self.entries,
            channels: self.channels,
        }
    }
}

/// Registry of streaming channels and provisioning slots.
///
/// Every subscription runs on its own task, so a slow collector or a stalled
/// subscriber on one channel never delays another.
pub struct PeripheralService {
    slots: ProvisioningSlots,
    entries: BTreeMap<u16, Entry>,
    channels: Vec<Arc<StreamingCharacteristic>>,
}

impl PeripheralService {
    pub fn builder(store: Arc<dyn ProvisioningStore>) -> ServiceBuilder {
        ServiceBuilder {
            slots: ProvisioningSlots::new(store),
            entries: BTreeMap::new(),
            channels: Vec::new(),
            next_handle: FIRST_HANDLE,
        }
    }

    /// The device's service: network list, temperature, and device record
    /// channels, followed by the four provisioning slots.
    ///
    /// `base` supplies the poll, timeout, and empty-result settings; each
    /// channel uses its own frame size.
    pub fn standard(
        store: Arc<dyn ProvisioningStore>,
        scanner: Arc<dyn NetworkScanner>,
        sensor: Arc<dyn SensorSource>,
        base: ChannelConfig,
    ) -> Result<Self> {
        let networks = StreamingCharacteristic::new(
            "networks",
            Arc::new(NetworkListCollector::new(scanner)),
            base.clone().with_frame_size(COMPACT_FRAME_SIZE),
        )?;
        let temperature = StreamingCharacteristic::new(
            "temperature",
            Arc::new(TemperatureCollector::new(sensor)),
            base.clone().with_frame_size(COMPACT_FRAME_SIZE),
        )?;
        let device = StreamingCharacteristic::new(
            "device",
            Arc::new(DeviceRecordCollector::new(store.clone())),
            base.with_frame_size(STANDARD_FRAME_SIZE),
        )?;

        Ok(Self::builder(store)
            .channel(networks, NETWORKS_TRIGGER_UUID, NETWORKS_NOTIFY_UUID)
            .channel(temperature, TEMPERATURE_TRIGGER_UUID, TEMPERATURE_NOTIFY_UUID)
            .channel(device, DEVICE_TRIGGER_UUID, DEVICE_NOTIFY_UUID)
            .slot(Slot::Identifier)
            .slot(Slot::CorrelationId)
            .slot(Slot::Environment)
            .slot(Slot::NetworkAddress)
            .build())
    }

    fn entry(&self, handle: u16) -> Result<&Entry> {
        self.entries
            .get(&handle)
            .ok_or(PeripheralError::UnknownHandle(handle))
    }

    /// Read an attribute value.
    pub fn read(&self, handle: u16) -> Result<Bytes> {
        match &self.entry(handle)?.attribute {
            Attribute::SlotRead(slot) => Ok(Bytes::from(self.slots.read(*slot))),
            _ => Err(PeripheralError::NotReadable(handle)),
        }
    }

    /// Write an attribute value.
    ///
    /// Trigger writes set or cancel the channel's pending request. Slot
    /// writes are validated before anything is stored.
    pub fn write(&self, handle: u16, value: &[u8]) -> Result<WriteOutcome> {
        let entry = self.entry(handle)?;
        match &entry.attribute {
            Attribute::Trigger(channel) => {
                let requested = channel.gate().apply_command(value);
                debug!(channel = channel.name(), handle, requested, "trigger write");
                Ok(WriteOutcome::Stored)
            }
            Attribute::SlotWrite(slot) => self.slots.write(*slot, value),
            _ => Err(PeripheralError::NotWritable(handle)),
        }
    }

    /// Start streaming a channel to `notifier` on a new task.
    ///
    /// The task ends when `cancel` fires or the notifier reports that the
    /// subscriber is gone.
    pub fn subscribe(
        &self,
        handle: u16,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let channel = match &self.entry(handle)?.attribute {
            Attribute::Stream(channel) => channel.clone(),
            _ => return Err(PeripheralError::NotSubscribable(handle)),
        };
        info!(channel = channel.name(), handle, "subscribed");
        Ok(tokio::spawn(async move {
            channel.run(notifier, cancel).await;
        }))
    }

    pub fn describe(&self) -> ServiceDescriptor {
        let characteristics = self
            .entries
            .iter()
            .map(|(handle, entry)| CharacteristicDescriptor {
                handle: *handle,
                name: entry.name.clone(),
                uuid: entry.uuid.to_string(),
                properties: entry
                    .attribute
                    .properties()
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
                frame_size: match &entry.attribute {
                    Attribute::Stream(channel) => Some(channel.config().frame_size),
                    _ => None,
                },
            })
            .collect();
        ServiceDescriptor {
            uuid: SERVICE_UUID.to_string(),
            local_name: LOCAL_NAME.to_string(),
            characteristics,
        }
    }

    /// Handle of the attribute named `name`.
    pub fn handle_of(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(handle, _)| *handle)
    }

    pub fn channel(&self, name: &str) -> Option<&Arc<StreamingCharacteristic>> {
        self.channels.iter().find(|channel| channel.name() == name)
    }

    pub fn channels(&self) -> &[Arc<StreamingCharacteristic>] {
        &self.channels
    }

    pub fn slots(&self) -> &ProvisioningSlots {
        &self.slots
    }
}
