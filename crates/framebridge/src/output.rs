use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Row, Table};
use serde::Serialize;
use serde_json::Value;

pub const SCHEMA_BASE: &str = "https://schemas.3leaps.dev/framebridge/cli/v1";

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn schema_id(name: &str) -> String {
    format!("{SCHEMA_BASE}/{name}.schema.json")
}

/// Print `value` as one line of JSON.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn table<T: Into<Row>>(header: T) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Compact single-line rendering of a payload.
pub fn data_preview(data: &Value) -> String {
    match data {
        Value::Null => "-".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn preview_is_compact() {
        assert_eq!(data_preview(&Value::Null), "-");
        assert_eq!(data_preview(&json!("hi")), "hi");
        assert_eq!(data_preview(&json!({ "a": [1, 2] })), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn schema_ids_share_base() {
        assert_eq!(
            schema_id("envelope"),
            "https://schemas.3leaps.dev/framebridge/cli/v1/envelope.schema.json"
        );
    }
}
