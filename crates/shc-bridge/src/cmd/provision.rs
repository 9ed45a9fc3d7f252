use std::sync::Arc;

use serde::Serialize;
use shc_device::{FileStore, ProvisioningStore};
use shc_peripheral::{ProvisioningSlots, Slot, WriteOutcome};

use crate::cmd::ProvisionArgs;
use crate::exit::{device_error, peripheral_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_pretty, render_table, OutputFormat};

#[derive(Serialize)]
struct SlotResult {
    slot: &'static str,
    outcome: &'static str,
    value: String,
}

fn requested(args: &ProvisionArgs) -> Vec<(Slot, &str)> {
    [
        (Slot::Identifier, args.identifier.as_deref()),
        (Slot::CorrelationId, args.correlation_id.as_deref()),
        (Slot::Environment, args.environment.as_deref()),
        (Slot::NetworkAddress, args.network_address.as_deref()),
    ]
    .into_iter()
    .filter_map(|(slot, value)| value.map(|value| (slot, value)))
    .collect()
}

pub fn run(args: ProvisionArgs, format: OutputFormat) -> CliResult<i32> {
    let writes = requested(&args);
    if writes.is_empty() {
        return Err(CliError::new(
            USAGE,
            "nothing to provision: pass at least one of --identifier, --correlation-id, --environment, --network-address",
        ));
    }

    // Validate everything before touching the store so a bad value never
    // leaves a partially provisioned device.
    for (slot, value) in &writes {
        slot.normalize(value.as_bytes())
            .map_err(|err| peripheral_error("provision rejected", err))?;
    }

    let store: Arc<dyn ProvisioningStore> = Arc::new(
        FileStore::open(&args.store.store).map_err(|err| device_error("store open failed", err))?,
    );
    let slots = ProvisioningSlots::new(store);

    let mut results = Vec::with_capacity(writes.len());
    for (slot, value) in writes {
        let outcome = slots
            .write(slot, value.as_bytes())
            .map_err(|err| peripheral_error("provision failed", err))?;
        results.push(SlotResult {
            slot: slot.name(),
            outcome: match outcome {
                WriteOutcome::Stored => "stored",
                WriteOutcome::Ignored => "ignored",
            },
            value: slots.read(slot),
        });
    }

    match format {
        OutputFormat::Json => print_json(&results),
        OutputFormat::Table | OutputFormat::Pretty => {
            let rows: Vec<(String, String)> = results
                .iter()
                .map(|r| (r.slot.to_string(), format!("{} ({})", r.value, r.outcome)))
                .collect();
            if format == OutputFormat::Table {
                println!("{}", render_table(["SLOT", "VALUE"], &rows));
            } else {
                print_pretty("provisioned", &rows);
            }
        }
        OutputFormat::Raw => {
            for r in &results {
                println!("{} {}", r.slot, r.outcome);
            }
        }
    }

    Ok(SUCCESS)
}
