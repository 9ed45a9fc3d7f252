use shc_frame::{frame_size_name, COMPACT_FRAME_SIZE, STANDARD_FRAME_SIZE};
use shc_peripheral::{LOCAL_NAME, SERVICE_UUID};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("shc-bridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: shc-bridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", target_triple());
    println!("local_name: {LOCAL_NAME}");
    println!("service_uuid: {SERVICE_UUID}");
    println!("frame_sizes: {}", frame_sizes());

    Ok(SUCCESS)
}

fn frame_sizes() -> String {
    [
        ("networks", COMPACT_FRAME_SIZE),
        ("temperature", COMPACT_FRAME_SIZE),
        ("device", STANDARD_FRAME_SIZE),
    ]
    .iter()
    .map(|(channel, size)| format!("{channel}={size} ({})", frame_size_name(*size)))
    .collect::<Vec<_>>()
    .join(", ")
}

fn target_triple() -> String {
    if let Some(target) = option_env!("SHC_BUILD_TARGET") {
        return target.to_string();
    }
    format!(
        "{}-unknown-{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    )
}
