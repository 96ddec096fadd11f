use std::fs;

use framebridge_envelope::encode;
use serde::Serialize;
use serde_json::Value;

use crate::cmd::EncodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{data_preview, print_json, schema_id, table, OutputFormat};

#[derive(Serialize)]
struct EncodedOutput<'a> {
    schema_id: String,
    event_name: &'a str,
    data: &'a Value,
    wire: &'a str,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.event.is_empty() {
        return Err(CliError::new(USAGE, "event name must not be empty"));
    }

    let data = resolve_data(&args)?;
    let wire = encode(&args.event, &data);
    tracing::debug!(event = %args.event, bytes = wire.len(), "encoded envelope");

    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            schema_id: schema_id("encoded-envelope"),
            event_name: &args.event,
            data: &data,
            wire: &wire,
        }),
        OutputFormat::Table => {
            let mut out = table(vec!["EVENT", "DATA", "WIRE"]);
            out.add_row(vec![args.event.clone(), data_preview(&data), wire.clone()]);
            println!("{out}");
        }
        OutputFormat::Pretty => println!("{wire}"),
    }

    Ok(SUCCESS)
}

fn resolve_data(args: &EncodeArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Ok(Value::Null)
}
