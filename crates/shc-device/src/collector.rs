use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{DeviceError, Result};

/// Default command used to sample the SoC temperature.
pub const DEFAULT_TEMPERATURE_COMMAND: &str = "vcgencmd measure_temp";

/// Default command used to scan for wireless networks.
pub const DEFAULT_SCAN_COMMAND: &str = "iw dev wlan0 scan";

/// Source of temperature readings, in degrees Celsius.
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn temperature(&self) -> Result<f64>;
}

/// Source of visible wireless network names.
#[async_trait]
pub trait NetworkScanner: Send + Sync {
    /// Visible SSIDs in scan order. Hidden networks are omitted.
    async fn scan(&self) -> Result<Vec<String>>;
}

/// Commands run by [`ShellHardware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareConfig {
    /// Shell used to interpret the commands (invoked with `-c`).
    pub shell: String,
    pub temperature_command: String,
    pub scan_command: String,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            temperature_command: DEFAULT_TEMPERATURE_COMMAND.to_string(),
            scan_command: DEFAULT_SCAN_COMMAND.to_string(),
        }
    }
}

/// Hardware access backed by shell commands.
///
/// Only one command runs at a time: the radio channels and the telemetry
/// sampler share a single instance, and the underlying tools are not safe to
/// run concurrently.
#[derive(Debug)]
pub struct ShellHardware {
    config: HardwareConfig,
    serial: Mutex<()>,
}

impl ShellHardware {
    pub fn new(config: HardwareConfig) -> Self {
        Self {
            config,
            serial: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    async fn run(&self, command: &str) -> Result<String> {
        let _guard = self.serial.lock().await;
        debug!(command, "running hardware command");

        let output = Command::new(&self.config.shell)
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DeviceError::CommandSpawn {
                command: command.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => output.status.to_string(),
                msg => format!("{}: {msg}", output.status),
            };
            return Err(DeviceError::CommandFailed {
                command: command.to_string(),
                reason,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!(command, bytes = stdout.len(), "hardware command finished");
        Ok(stdout)
    }
}

impl Default for ShellHardware {
    fn default() -> Self {
        Self::new(HardwareConfig::default())
    }
}

#[async_trait]
impl SensorSource for ShellHardware {
    async fn temperature(&self) -> Result<f64> {
        let output = self.run(&self.config.temperature_command).await?;
        parse_temperature(&output)
    }
}

#[async_trait]
impl NetworkScanner for ShellHardware {
    async fn scan(&self) -> Result<Vec<String>> {
        let output = self.run(&self.config.scan_command).await?;
        Ok(parse_ssids(&output))
    }
}

/// Extract the reading from `temp=<value>'C` output.
pub fn parse_temperature(output: &str) -> Result<f64> {
    const PREFIX: &str = "temp=";
    const SUFFIX: &str = "'C";

    let parse_err = || DeviceError::Parse {
        what: "temperature",
    };
    let start = output.find(PREFIX).ok_or_else(parse_err)? + PREFIX.len();
    let rest = &output[start..];
    let end = rest.find(SUFFIX).ok_or_else(parse_err)?;
    rest[..end].trim().parse::<f64>().map_err(|_| parse_err())
}

/// Extract network names from lines that begin with `SSID:`.
///
/// Lines with an empty name (hidden networks) are skipped. Fields that
/// merely end in `SSID`, such as `HESSID:`, are not network names.
pub fn parse_ssids(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let name = line.trim_start().strip_prefix("SSID:")?.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
