use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use shc_device::{read_environment, FileStore, ProvisioningStore};
use shc_peripheral::{ProvisioningSlots, Slot};
use shc_telemetry::CadenceTable;

use crate::cmd::run::endpoint_table;
use crate::cmd::StatusArgs;
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print_json, print_pretty, render_table, OutputFormat};

#[derive(Serialize)]
struct StatusOutput {
    store: String,
    slots: BTreeMap<&'static str, String>,
    environment: Option<String>,
    telemetry_endpoint: Option<String>,
    telemetry_interval_ms: u64,
}

impl StatusOutput {
    fn rows(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = Slot::ALL
            .iter()
            .map(|slot| {
                let value = self.slots.get(slot.name()).cloned().unwrap_or_default();
                (slot.name().to_string(), value)
            })
            .collect();
        rows.push((
            "telemetry endpoint".to_string(),
            self.telemetry_endpoint
                .clone()
                .unwrap_or_else(|| "(none)".to_string()),
        ));
        rows.push((
            "telemetry interval".to_string(),
            format!("{}ms", self.telemetry_interval_ms),
        ));
        rows.push(("store".to_string(), self.store.clone()));
        rows
    }
}

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let store = FileStore::open(&args.store.store)
        .map_err(|err| device_error("store open failed", err))?;
    let endpoints = endpoint_table(args.endpoint.endpoint.as_deref())?;

    let environment =
        read_environment(&store).map_err(|err| device_error("store read failed", err))?;
    let store_path = store.path().display().to_string();
    let store: Arc<dyn ProvisioningStore> = Arc::new(store);
    let slots = ProvisioningSlots::new(store);

    let output = StatusOutput {
        store: store_path,
        slots: Slot::ALL
            .iter()
            .map(|slot| (slot.name(), slots.read(*slot)))
            .collect(),
        environment: environment.map(|env| env.as_str().to_string()),
        telemetry_endpoint: endpoints.resolve(environment).map(|ep| ep.url()),
        telemetry_interval_ms: CadenceTable::default().interval(environment).as_millis() as u64,
    };

    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Table => println!("{}", render_table(["FIELD", "VALUE"], &output.rows())),
        OutputFormat::Pretty => print_pretty("shc-bridge status", &output.rows()),
        OutputFormat::Raw => {
            for slot in Slot::ALL {
                let value = output.slots.get(slot.name()).map(String::as_str);
                println!("{}={}", slot.name(), value.unwrap_or_default());
            }
        }
    }

    Ok(SUCCESS)
}
