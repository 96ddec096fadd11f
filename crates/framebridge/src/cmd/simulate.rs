use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use framebridge_peer::{
    listener, BridgeConfig, ChildFrame, Direction, Endpoint, Loopback, MethodError, PeerError,
    TranscriptEntry,
};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::SimulateArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE};
use crate::output::{data_preview, print_json, schema_id, table, OutputFormat};

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Event { name: String, data: Value },
    Navigate(String),
    Call { method: String, args: Vec<Value> },
}

#[derive(Serialize)]
struct TranscriptRow {
    direction: Direction,
    event: Option<String>,
    data: Value,
    outcome: String,
}

impl From<TranscriptEntry> for TranscriptRow {
    fn from(entry: TranscriptEntry) -> Self {
        Self {
            direction: entry.direction,
            outcome: entry.outcome.label(),
            event: entry.event_name,
            data: entry.data,
        }
    }
}

#[derive(Serialize)]
struct CallOutcome {
    uid: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timed_out: bool,
}

#[derive(Serialize)]
struct SimulationReport {
    schema_id: String,
    href: String,
    child_href: Option<String>,
    document_loads: usize,
    ready: bool,
    queued: usize,
    transcript: Vec<TranscriptRow>,
    calls: Vec<CallOutcome>,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let steps = args
        .steps
        .iter()
        .map(|step| parse_step(step))
        .collect::<CliResult<Vec<_>>>()?;
    let rpc_timeout = parse_duration(&args.rpc_timeout)?;

    let mut config = BridgeConfig::default()
        .with_debug(args.debug)
        .with_rpc_timeout(Some(rpc_timeout));
    if let Some(origin) = &args.origin {
        config = config.with_origin(origin);
    }
    if let Some(src) = &args.src {
        config = config.with_src(src);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    let report = runtime.block_on(simulate(&args.href, config, steps))?;

    print_report(&report, format);
    if report.calls.iter().any(|call| call.timed_out) {
        return Ok(TIMEOUT);
    }
    Ok(SUCCESS)
}

async fn simulate(
    href: &str,
    config: BridgeConfig,
    steps: Vec<Step>,
) -> CliResult<SimulationReport> {
    let custom_events: Vec<String> = steps
        .iter()
        .filter_map(|step| match step {
            Step::Event { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();

    let session = Loopback::new(href, config)
        .map_err(|err| peer_error("failed to create bridge", err))?
        .with_child_setup(move |child| {
            register_demo_methods(child);
            for name in &custom_events {
                let event = name.clone();
                child.on(
                    name,
                    listener(move |data, _, _| {
                        tracing::info!(event = %event, data = %data, "child received event");
                    }),
                );
            }
        });
    let bridge = Arc::clone(session.bridge());

    let mut calls = Vec::new();
    for step in steps {
        match step {
            Step::Event { name, data } => bridge
                .trigger(&name, data)
                .map_err(|err| peer_error("trigger failed", err))?,
            Step::Navigate(url) => bridge
                .navigate(&url)
                .map_err(|err| peer_error("navigate failed", err))?,
            Step::Call { method, args } => {
                let pending = bridge
                    .call_method(&method, args)
                    .map_err(|err| peer_error("call failed", err))?;
                let uid = pending.uid();
                calls.push((uid, method, tokio::spawn(pending.into_future())));
            }
        }
    }

    session.settle().await;

    let mut outcomes = Vec::with_capacity(calls.len());
    for (uid, method, handle) in calls {
        let joined = handle
            .await
            .map_err(|err| CliError::new(INTERNAL, format!("call task failed: {err}")))?;
        outcomes.push(match joined {
            Ok(response) => CallOutcome {
                uid,
                method,
                result: Some(response.data),
                error: None,
                timed_out: false,
            },
            Err(err) => CallOutcome {
                uid,
                method,
                timed_out: matches!(err, PeerError::Timeout(_)),
                result: None,
                error: Some(err.to_string()),
            },
        });
    }

    Ok(SimulationReport {
        schema_id: schema_id("simulation-report"),
        href: href.to_string(),
        child_href: session.child_href(),
        document_loads: session.document_loads(),
        ready: bridge.is_ready(),
        queued: bridge.queue_len(),
        transcript: session
            .take_transcript()
            .into_iter()
            .map(TranscriptRow::from)
            .collect(),
        calls: outcomes,
    })
}

fn register_demo_methods(child: &Arc<ChildFrame>) {
    child
        .register_method("echo", |args| {
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        })
        .register_method("add", |args| {
            let total = args
                .iter()
                .map(|value| value.as_i64().ok_or("add expects integers"))
                .sum::<Result<i64, _>>()?;
            Ok(Value::from(total))
        })
        .register_method("fail", |_| Err(MethodError::new("always fails")));
}

fn parse_step(input: &str) -> CliResult<Step> {
    let (kind, rest) = input
        .split_once(':')
        .ok_or_else(|| CliError::new(USAGE, format!("step must be KIND:VALUE, got {input:?}")))?;

    match kind {
        "event" => {
            let (name, data) = split_payload(rest)?;
            if name.is_empty() {
                return Err(CliError::new(USAGE, "event step needs a name"));
            }
            Ok(Step::Event {
                name,
                data: data.unwrap_or(Value::Null),
            })
        }
        "navigate" => {
            if rest.is_empty() {
                return Err(CliError::new(USAGE, "navigate step needs a URL"));
            }
            Ok(Step::Navigate(rest.to_string()))
        }
        "call" => {
            let (method, data) = split_payload(rest)?;
            if method.is_empty() {
                return Err(CliError::new(USAGE, "call step needs a method name"));
            }
            let args = match data {
                None => Vec::new(),
                Some(Value::Array(args)) => args,
                Some(_) => {
                    return Err(CliError::new(USAGE, "call arguments must be a JSON array"));
                }
            };
            Ok(Step::Call { method, args })
        }
        other => Err(CliError::new(
            USAGE,
            format!("unknown step kind {other:?} (expected event, navigate or call)"),
        )),
    }
}

fn split_payload(rest: &str) -> CliResult<(String, Option<Value>)> {
    match rest.split_once('=') {
        Some((name, json)) => {
            let value = serde_json::from_str(json).map_err(|err| {
                CliError::new(USAGE, format!("step payload for {name:?} is not valid JSON: {err}"))
            })?;
            Ok((name.to_string(), Some(value)))
        }
        None => Ok((rest.to_string(), None)),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
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

fn arrow(direction: Direction) -> &'static str {
    match direction {
        Direction::ParentToChild => "parent -> child",
        Direction::ChildToParent => "child -> parent",
    }
}

fn print_report(report: &SimulationReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut transcript = table(vec!["DIRECTION", "EVENT", "DATA", "OUTCOME"]);
            for row in &report.transcript {
                transcript.add_row(vec![
                    arrow(row.direction).to_string(),
                    row.event.clone().unwrap_or_else(|| "<foreign>".to_string()),
                    data_preview(&row.data),
                    row.outcome.clone(),
                ]);
            }
            println!("{transcript}");

            if !report.calls.is_empty() {
                let mut calls = table(vec!["UID", "METHOD", "RESULT"]);
                for call in &report.calls {
                    calls.add_row(vec![
                        call.uid.to_string(),
                        call.method.clone(),
                        call_result(call),
                    ]);
                }
                println!("{calls}");
            }
        }
        OutputFormat::Pretty => {
            for row in &report.transcript {
                println!(
                    "{} {} {} [{}]",
                    arrow(row.direction),
                    row.event.as_deref().unwrap_or("<foreign>"),
                    data_preview(&row.data),
                    row.outcome
                );
            }
            for call in &report.calls {
                println!("call #{} {} => {}", call.uid, call.method, call_result(call));
            }
            println!(
                "child={} loads={} ready={} queued={}",
                report.child_href.as_deref().unwrap_or("-"),
                report.document_loads,
                report.ready,
                report.queued
            );
        }
    }
}

fn call_result(call: &CallOutcome) -> String {
    match (&call.result, &call.error) {
        (Some(value), _) => data_preview(value),
        (None, Some(error)) => format!("error: {error}"),
        (None, None) => "-".to_string(),
    }
}
