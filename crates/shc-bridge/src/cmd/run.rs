use std::sync::Arc;

use shc_device::{FileStore, HardwareConfig, ProvisioningStore, ShellHardware};
use shc_frame::DEFAULT_FRAME_SIZE;
use shc_peripheral::{ChannelConfig, PeripheralService, RelayServer};
use shc_telemetry::{
    Endpoint, EndpointTable, TelemetryConfig, TelemetryError, TelemetrySession, WsConnector,
};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{parse_duration, RunArgs};
use crate::exit::{
    device_error, io_error, peripheral_error, telemetry_error, CliError, CliResult, INTERNAL,
    SUCCESS,
};

/// Build the telemetry endpoint table, with `--endpoint` as the fallback.
pub fn endpoint_table(endpoint: Option<&str>) -> CliResult<EndpointTable> {
    let table = EndpointTable::default();
    match endpoint {
        Some(raw) => {
            let fallback: Endpoint = raw
                .parse()
                .map_err(|err: TelemetryError| telemetry_error("invalid --endpoint", err))?;
            Ok(table.with_fallback(fallback))
        }
        None => Ok(table),
    }
}

pub fn run(args: RunArgs) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("shc-bridge")
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(serve(args))
}

async fn serve(args: RunArgs) -> CliResult<i32> {
    let channel_config = ChannelConfig {
        frame_size: DEFAULT_FRAME_SIZE,
        poll_interval: parse_duration(&args.poll_interval)?,
        collect_timeout: parse_duration(&args.collect_timeout)?,
        empty_policy: args.empty_policy.into(),
    };
    let endpoints = endpoint_table(args.endpoint.endpoint.as_deref())?;

    let store: Arc<dyn ProvisioningStore> = Arc::new(
        FileStore::open(&args.store.store).map_err(|err| device_error("store open failed", err))?,
    );
    let hardware = Arc::new(ShellHardware::new(HardwareConfig {
        temperature_command: args.temperature_command,
        scan_command: args.scan_command,
        ..HardwareConfig::default()
    }));

    let service = PeripheralService::standard(
        store.clone(),
        hardware.clone(),
        hardware.clone(),
        channel_config,
    )
    .map_err(|err| peripheral_error("service setup failed", err))?;

    // Handlers must be live before the relay socket is visible.
    let mut interrupt =
        signal(SignalKind::interrupt()).map_err(|err| io_error("signal setup failed", err))?;
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|err| io_error("signal setup failed", err))?;

    let relay = RelayServer::bind(&args.relay_socket, Arc::new(service))
        .map_err(|err| peripheral_error("relay bind failed", err))?;

    let shutdown = CancellationToken::new();
    let mut relay_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { relay.serve(shutdown).await })
    };

    let telemetry_task = if args.no_telemetry {
        info!("telemetry disabled");
        None
    } else {
        let config = TelemetryConfig {
            endpoints,
            ..TelemetryConfig::default()
        };
        let session = TelemetrySession::new(config, store, hardware, Arc::new(WsConnector));
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move { session.run(shutdown).await }))
    };

    info!(relay = ?args.relay_socket, "bridge running");

    let finished = tokio::select! {
        _ = interrupt.recv() => {
            info!("interrupt received; shutting down");
            None
        }
        _ = terminate.recv() => {
            info!("terminate received; shutting down");
            None
        }
        ended = &mut relay_task => {
            warn!("relay server stopped unexpectedly");
            Some(ended)
        }
    };

    shutdown.cancel();
    let relay_result = match finished {
        Some(ended) => ended,
        None => relay_task.await,
    };

    if let Some(task) = telemetry_task {
        task.await
            .map_err(|err| CliError::new(INTERNAL, format!("telemetry task: {err}")))?;
    }

    match relay_result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(peripheral_error("relay server failed", err)),
        Err(err) => return Err(CliError::new(INTERNAL, format!("relay task: {err}"))),
    }

    info!("bridge stopped");
    Ok(SUCCESS)
}
