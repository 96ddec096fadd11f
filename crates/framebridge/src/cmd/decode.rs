use std::fs;

use framebridge_envelope::{decode_str, event_kind, Envelope, EventKind};
use framebridge_schema::SchemaRegistry;
use serde::Serialize;
use serde_json::Value;

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, schema_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{data_preview, print_json, schema_id, table, OutputFormat};

#[derive(Serialize)]
struct DecodedOutput<'a> {
    schema_id: String,
    event_name: &'a str,
    kind: String,
    data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    validated: Option<bool>,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let envelope = decode_str(payload.trim())
        .ok_or_else(|| CliError::new(DATA_INVALID, "payload is not a framebridge envelope"))?;

    let validated = match &args.validate {
        Some(dir) => {
            let registry = SchemaRegistry::from_directory(dir)
                .map_err(|err| schema_error("failed loading schemas", err))?;
            registry
                .validate(&envelope.event_name, &envelope.data)
                .map_err(|err| schema_error("payload rejected", err))?;
            Some(true)
        }
        None => None,
    };

    print_envelope(&envelope, validated, format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &DecodeArgs) -> CliResult<String> {
    if let Some(payload) = &args.payload {
        return Ok(payload.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "provide a payload or --file"))
}

fn kind_label(kind: EventKind) -> String {
    match kind {
        EventKind::ChildReady => "child-ready".to_string(),
        EventKind::ChildNavigating => "child-navigating".to_string(),
        EventKind::Navigate => "navigate".to_string(),
        EventKind::RpcCall => "rpc-call".to_string(),
        EventKind::RpcResponse(uid) => format!("rpc-response({uid})"),
        EventKind::Custom => "custom".to_string(),
    }
}

fn print_envelope(envelope: &Envelope, validated: Option<bool>, format: OutputFormat) {
    let kind = kind_label(event_kind(&envelope.event_name));
    match format {
        OutputFormat::Json => print_json(&DecodedOutput {
            schema_id: schema_id("decoded-envelope"),
            event_name: &envelope.event_name,
            kind,
            data: &envelope.data,
            validated,
        }),
        OutputFormat::Table => {
            let mut out = table(vec!["EVENT", "KIND", "DATA"]);
            out.add_row(vec![
                envelope.event_name.clone(),
                kind,
                data_preview(&envelope.data),
            ]);
            println!("{out}");
        }
        OutputFormat::Pretty => println!(
            "event={} kind={} data={}",
            envelope.event_name,
            kind,
            data_preview(&envelope.data)
        ),
    }
}
