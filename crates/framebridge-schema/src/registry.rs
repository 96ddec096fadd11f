use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use framebridge_envelope::{CHILD_NAVIGATING, CHILD_READY, NAVIGATE, RPC_CALL};
use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::validate_data;

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Event-keyed registry of compiled JSON Schema validators.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Register a schema for an event from a JSON string.
    pub fn register(&mut self, event: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(event, &schema)
    }

    /// Register a schema for an event from a JSON value.
    pub fn register_value(&mut self, event: &str, schema: &Value) -> Result<()> {
        let mut schema = schema.clone();
        if self.config.strict_mode {
            close_object_schemas(&mut schema);
        }

        let compiled = jsonschema::validator_for(&schema)
            .map_err(|err| SchemaError::CompileFailed(format!("{event}: {err}")))?;

        tracing::debug!(event, "registered payload schema");
        self.validators.insert(event.to_string(), compiled);
        Ok(())
    }

    /// Load schemas from a directory of `<event>.schema.json` files.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    ///
    /// Symlinked schema files are refused. Files without the schema suffix
    /// are ignored.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        let mut loaded = 0usize;
        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(event) = event_from_file_name(&file_name) else {
                continue;
            };

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if metadata.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !metadata.is_file() {
                continue;
            }

            loaded += 1;
            if loaded > registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    registry.config.max_schemas_from_directory
                )));
            }

            let content = read_limited(&entry_path, registry.config.max_schema_file_size)?;
            registry.register(&event, &content)?;
        }

        Ok(registry)
    }

    /// Load from embedded `(event, schema)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (event, schema) in schemas {
            registry.register(event, schema)?;
        }
        Ok(registry)
    }

    /// Validate an event payload against its schema.
    pub fn validate(&self, event: &str, data: &Value) -> Result<()> {
        match self.validators.get(event) {
            Some(validator) => validate_data(event, data, validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(event.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Check if an event has a registered schema.
    pub fn has_schema(&self, event: &str) -> bool {
        self.validators.contains_key(event)
    }

    /// Events that have registered schemas, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.validators.keys().cloned().collect();
        events.sort_unstable();
        events
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("events", &self.events())
            .field("config", &self.config)
            .finish()
    }
}

/// Map a schema file name to the event it describes.
///
/// Protocol events use their short form (`child-navigate.schema.json`);
/// any other stem is taken as a custom event name verbatim.
fn event_from_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(SCHEMA_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }

    let event = match stem {
        "child-ready" => CHILD_READY,
        "child-navigating" => CHILD_NAVIGATING,
        "child-navigate" => NAVIGATE,
        "rpc-call" => RPC_CALL,
        custom => custom,
    };
    Some(event.to_string())
}

fn read_limited(path: &Path, max_bytes: usize) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;

    let limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;

    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large (max {max_bytes} bytes): {}",
            path.display()
        )));
    }
    Ok(content)
}

/// Add `additionalProperties: false` to every object schema that leaves it open.
fn close_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if declares_object(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for key in ["properties", "$defs", "definitions"] {
                if let Some(Value::Object(children)) = map.get_mut(key) {
                    children.values_mut().for_each(close_object_schemas);
                }
            }
            for key in ["items", "allOf", "anyOf", "oneOf", "prefixItems"] {
                if let Some(child) = map.get_mut(key) {
                    close_object_schemas(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_object_schemas),
        _ => {}
    }
}

fn declares_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => map.contains_key("properties") || map.contains_key("required"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    const NAVIGATE_SCHEMA: &str = r#"{
        "type": "object",
        "properties": { "url": { "type": "string" } },
        "required": ["url"]
    }"#;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framebridge-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn register_and_validate() {
        let mut registry = SchemaRegistry::new();
        registry.register(NAVIGATE, NAVIGATE_SCHEMA).unwrap();

        assert!(registry.validate(NAVIGATE, &json!({ "url": "/a" })).is_ok());
        assert!(matches!(
            registry.validate(NAVIGATE, &json!({ "url": 5 })),
            Err(SchemaError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn missing_schema_is_permissive_by_default() {
        let registry = SchemaRegistry::new();
        assert!(registry.validate("cart:updated", &json!([1, 2])).is_ok());
    }

    #[test]
    fn missing_schema_fails_when_configured() {
        let registry = SchemaRegistry::with_config(RegistryConfig {
            fail_on_missing_schema: true,
            ..RegistryConfig::default()
        });
        assert!(matches!(
            registry.validate("cart:updated", &Value::Null),
            Err(SchemaError::NoSchema(event)) if event == "cart:updated"
        ));
    }

    #[test]
    fn strict_mode_rejects_undeclared_properties() {
        let mut strict = SchemaRegistry::with_config(RegistryConfig {
            strict_mode: true,
            ..RegistryConfig::default()
        });
        strict.register(NAVIGATE, NAVIGATE_SCHEMA).unwrap();

        let mut permissive = SchemaRegistry::new();
        permissive.register(NAVIGATE, NAVIGATE_SCHEMA).unwrap();

        let payload = json!({ "url": "/a", "extra": true });
        assert!(permissive.validate(NAVIGATE, &payload).is_ok());
        assert!(strict.validate(NAVIGATE, &payload).is_err());
    }

    #[test]
    fn invalid_schema_fails_to_compile() {
        let mut registry = SchemaRegistry::new();
        let result = registry.register("x", r#"{"type": 12}"#);
        assert!(matches!(result, Err(SchemaError::CompileFailed(_))));
    }

    #[test]
    fn file_names_map_to_events() {
        assert_eq!(
            event_from_file_name("child-navigate.schema.json").as_deref(),
            Some(NAVIGATE)
        );
        assert_eq!(
            event_from_file_name("rpc-call.schema.json").as_deref(),
            Some(RPC_CALL)
        );
        assert_eq!(
            event_from_file_name("cart-updated.schema.json").as_deref(),
            Some("cart-updated")
        );
        assert!(event_from_file_name(".schema.json").is_none());
        assert!(event_from_file_name("README.md").is_none());
    }

    #[test]
    fn loads_directory() {
        let dir = temp_dir("load");
        std::fs::write(dir.join("child-navigate.schema.json"), NAVIGATE_SCHEMA).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let registry = SchemaRegistry::from_directory(&dir).unwrap();
        assert_eq!(registry.events(), vec![NAVIGATE.to_string()]);
        assert!(registry.has_schema(NAVIGATE));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_oversized_schema_file() {
        let dir = temp_dir("large");
        let padding = " ".repeat(512);
        std::fs::write(
            dir.join("big.schema.json"),
            format!("{{{padding}\"type\":\"object\"}}"),
        )
        .unwrap();

        let result = SchemaRegistry::from_directory_with_config(
            &dir,
            RegistryConfig {
                max_schema_file_size: 128,
                ..RegistryConfig::default()
            },
        );
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinked_schema() {
        let dir = temp_dir("symlink");
        let target = dir.join("target.json");
        std::fs::write(&target, NAVIGATE_SCHEMA).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("child-navigate.schema.json")).unwrap();

        let result = SchemaRegistry::from_directory(&dir);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn embedded_schemas() {
        let registry = SchemaRegistry::from_embedded(&[(NAVIGATE, NAVIGATE_SCHEMA)]).unwrap();
        assert!(registry.validate(NAVIGATE, &json!({})).is_err());
    }
}
