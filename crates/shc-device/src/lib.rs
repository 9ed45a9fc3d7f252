//! Device-side collaborators.
//!
//! Everything the bridge core calls into but does not own: the persistent
//! provisioning store, the deployment [`Environment`], and the hardware
//! commands that sample temperature and scan for wireless networks.

pub mod collector;
pub mod environment;
pub mod error;
pub mod store;

pub use collector::{
    parse_ssids, parse_temperature, HardwareConfig, NetworkScanner, SensorSource, ShellHardware,
    DEFAULT_SCAN_COMMAND, DEFAULT_TEMPERATURE_COMMAND,
};
pub use environment::Environment;
pub use error::{DeviceError, Result};
pub use store::{read_environment, FileStore, MemoryStore, ProvisioningStore, StoreKey};
