use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wrap an event in a wire envelope.
    Encode(EncodeArgs),
    /// Inspect a wire payload.
    Decode(DecodeArgs),
    /// Run a parent/child session in memory and print what was delivered.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Event name.
    pub event: String,
    /// JSON payload.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the JSON payload from a file.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire payload (a JSON string).
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub payload: Option<String>,
    /// Read the wire payload from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Schema directory for payload validation.
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address of the hosting page.
    #[arg(long, default_value = "https://app.example.com/")]
    pub href: String,
    /// Origin accepted by both ends. Default: the hosting page's origin.
    #[arg(long, env = "FRAMEBRIDGE_ORIGIN")]
    pub origin: Option<String>,
    /// Initial frame address. Default: the hosting page's address.
    #[arg(long, env = "FRAMEBRIDGE_SRC")]
    pub src: Option<String>,
    /// Step to run before the child is ready (repeatable):
    /// `event:NAME[=JSON]`, `navigate:URL` or `call:METHOD[=JSON_ARRAY]`.
    #[arg(long = "step", value_name = "STEP")]
    pub steps: Vec<String>,
    /// Log protocol traffic at debug level.
    #[arg(long)]
    pub debug: bool,
    /// Bound on each remote method call (e.g. 5s, 500ms).
    #[arg(long, default_value = "2s")]
    pub rpc_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
