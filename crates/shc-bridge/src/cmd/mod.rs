use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use shc_device::{DEFAULT_SCAN_COMMAND, DEFAULT_TEMPERATURE_COMMAND};
use shc_peripheral::EmptyResultPolicy;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod provision;
pub mod run;
pub mod status;
pub mod version;

/// Default provisioning store location.
pub const DEFAULT_STORE_PATH: &str = "/var/lib/shc-bridge/state.json";

/// Default relay socket location.
pub const DEFAULT_RELAY_SOCKET: &str = "/run/shc-bridge/relay.sock";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the radio relay and run the telemetry session until interrupted.
    Run(RunArgs),
    /// Show provisioning slots and the resolved telemetry endpoint.
    Status(StatusArgs),
    /// Write provisioning slots locally.
    Provision(ProvisionArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Status(args) => status::run(args, format),
        Command::Provision(args) => provision::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Provisioning store file.
    #[arg(long, env = "SHC_STORE", default_value = DEFAULT_STORE_PATH)]
    pub store: PathBuf,
}

#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Telemetry endpoint used while no environment is provisioned
    /// (e.g. ws://192.168.0.10:8081).
    #[arg(long, env = "SHC_TELEMETRY_ENDPOINT")]
    pub endpoint: Option<String>,
}

/// Empty collector result handling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmptyPolicyArg {
    Abort,
    Warn,
    Stream,
}

impl From<EmptyPolicyArg> for EmptyResultPolicy {
    fn from(arg: EmptyPolicyArg) -> Self {
        match arg {
            EmptyPolicyArg::Abort => EmptyResultPolicy::Abort,
            EmptyPolicyArg::Warn => EmptyResultPolicy::Warn,
            EmptyPolicyArg::Stream => EmptyResultPolicy::Stream,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Relay socket path for the radio daemon.
    #[arg(long, env = "SHC_RELAY_SOCKET", default_value = DEFAULT_RELAY_SOCKET)]
    pub relay_socket: PathBuf,
    /// Do not start the telemetry session.
    #[arg(long)]
    pub no_telemetry: bool,
    /// What a channel does when its collector finds nothing.
    #[arg(long, value_enum, default_value = "abort")]
    pub empty_policy: EmptyPolicyArg,
    /// Idle wakeup interval of each channel (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub poll_interval: String,
    /// Upper bound on one collection (e.g. 30s).
    #[arg(long, default_value = "30s")]
    pub collect_timeout: String,
    /// Command that prints `temp=<celsius>'C`.
    #[arg(long, env = "SHC_TEMPERATURE_COMMAND", default_value = DEFAULT_TEMPERATURE_COMMAND)]
    pub temperature_command: String,
    /// Command that prints one `SSID: <name>` line per network.
    #[arg(long, env = "SHC_SCAN_COMMAND", default_value = DEFAULT_SCAN_COMMAND)]
    pub scan_command: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Device identifier (write-once).
    #[arg(long)]
    pub identifier: Option<String>,
    /// Backend correlation UUID (write-once).
    #[arg(long)]
    pub correlation_id: Option<String>,
    /// Deployment environment: dev or prod.
    #[arg(long)]
    pub environment: Option<String>,
    /// Static IPv4 address.
    #[arg(long)]
    pub network_address: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
