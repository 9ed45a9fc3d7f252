mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "shc-bridge",
    version,
    about = "Home automation bridge: radio peripheral service and telemetry"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "SHC_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "SHC_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "shc-bridge",
            "run",
            "--relay-socket",
            "/tmp/relay.sock",
            "--no-telemetry",
            "--empty-policy",
            "warn",
        ])
        .expect("run args should parse");

        match cli.command {
            Command::Run(args) => {
                assert!(args.no_telemetry);
                assert_eq!(args.empty_policy, cmd::EmptyPolicyArg::Warn);
                assert_eq!(args.relay_socket.to_str(), Some("/tmp/relay.sock"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_provision_subcommand() {
        let cli = Cli::try_parse_from([
            "shc-bridge",
            "provision",
            "--store",
            "/tmp/state.json",
            "--environment",
            "dev",
        ])
        .expect("provision args should parse");
        assert!(matches!(cli.command, Command::Provision(_)));
    }

    #[test]
    fn rejects_unknown_empty_policy() {
        let err = Cli::try_parse_from(["shc-bridge", "run", "--empty-policy", "explode"])
            .expect_err("unknown policy should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["shc-bridge", "status", "--format", "json"])
            .expect("status args should parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
