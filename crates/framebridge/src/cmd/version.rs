use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    let version = env!("CARGO_PKG_VERSION");
    if !args.extended {
        println!("framebridge {version}");
        return Ok(SUCCESS);
    }

    println!("name: framebridge");
    println!("version: {version}");
    println!(
        "target: {}",
        option_env!("FRAMEBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "protocol_tag: {}",
        framebridge_envelope::PROTOCOL_TAG
    );
    println!(
        "features: peer={}, schema={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "schema"),
    );

    Ok(SUCCESS)
}
