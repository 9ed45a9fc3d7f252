use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use shc_device::{NetworkScanner, ProvisioningStore, SensorSource};

use crate::error::Result;
use crate::provisioning::{DeviceRecord, ProvisioningSlots};

/// Output of one collection: a serialized payload plus the number of
/// logical items in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub items: usize,
    pub payload: Bytes,
}

impl Collected {
    /// Serialize `value` as JSON.
    pub fn json<T: Serialize>(items: usize, value: &T) -> Result<Self> {
        Ok(Self {
            items,
            payload: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }
}

/// Produces the payload streamed by one channel.
#[async_trait]
pub trait PayloadCollector: Send + Sync {
    async fn collect(&self) -> Result<Collected>;
}

#[derive(Serialize)]
struct NetworkList<'a> {
    ssids: &'a [String],
}

/// Streams `{"ssids":[...]}` from a network scan.
pub struct NetworkListCollector {
    scanner: Arc<dyn NetworkScanner>,
}

impl NetworkListCollector {
    pub fn new(scanner: Arc<dyn NetworkScanner>) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl PayloadCollector for NetworkListCollector {
    async fn collect(&self) -> Result<Collected> {
        let ssids = self.scanner.scan().await?;
        Collected::json(ssids.len(), &NetworkList { ssids: &ssids })
    }
}

#[derive(Serialize)]
struct TemperatureReading {
    temperature: f64,
}

/// Streams `{"temperature":<celsius>}`.
pub struct TemperatureCollector {
    sensor: Arc<dyn SensorSource>,
}

impl TemperatureCollector {
    pub fn new(sensor: Arc<dyn SensorSource>) -> Self {
        Self { sensor }
    }
}

#[async_trait]
impl PayloadCollector for TemperatureCollector {
    async fn collect(&self) -> Result<Collected> {
        let temperature = self.sensor.temperature().await?;
        Collected::json(1, &TemperatureReading { temperature })
    }
}

/// Streams the provisioning record.
pub struct DeviceRecordCollector {
    slots: ProvisioningSlots,
}

impl DeviceRecordCollector {
    pub fn new(store: Arc<dyn ProvisioningStore>) -> Self {
        Self {
            slots: ProvisioningSlots::new(store),
        }
    }
}

#[async_trait]
impl PayloadCollector for DeviceRecordCollector {
    async fn collect(&self) -> Result<Collected> {
        let record: DeviceRecord = self.slots.record();
        Collected::json(1, &record)
    }
}

#[cfg(test)]
mod tests {
    use shc_device::{DeviceError, MemoryStore, StoreKey};

    use super::*;

    struct FixedScan(Vec<String>);

    #[async_trait]
    impl NetworkScanner for FixedScan {
        async fn scan(&self) -> shc_device::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSensor;

    #[async_trait]
    impl SensorSource for BrokenSensor {
        async fn temperature(&self) -> shc_device::Result<f64> {
            Err(DeviceError::Parse {
                what: "temperature",
            })
        }
    }

    #[tokio::test]
    async fn network_list_payload_shape() {
        let collector =
            NetworkListCollector::new(Arc::new(FixedScan(vec!["A".into(), "B".into()])));
        let collected = collector.collect().await.unwrap();
        assert_eq!(collected.items, 2);
        assert_eq!(collected.payload.as_ref(), br#"{"ssids":["A","B"]}"#);
    }

    #[tokio::test]
    async fn empty_scan_is_empty_collection() {
        let collector = NetworkListCollector::new(Arc::new(FixedScan(Vec::new())));
        let collected = collector.collect().await.unwrap();
        assert!(collected.is_empty());
        assert_eq!(collected.payload.as_ref(), br#"{"ssids":[]}"#);
    }

    #[tokio::test]
    async fn sensor_failure_propagates() {
        let collector = TemperatureCollector::new(Arc::new(BrokenSensor));
        assert!(collector.collect().await.is_err());
    }

    #[tokio::test]
    async fn device_record_uses_undefined_for_unset() {
        let store = Arc::new(MemoryStore::new());
        store.set(StoreKey::Identifier, "kitchen").unwrap();
        let collector = DeviceRecordCollector::new(store);

        let collected = collector.collect().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&collected.payload).unwrap();
        assert_eq!(value["identifier"], "kitchen");
        assert_eq!(value["correlationId"], "undefined");
        assert_eq!(value["environment"], "undefined");
    }
}
