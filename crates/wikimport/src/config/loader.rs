use std::path::Path;
use std::sync::LazyLock;

use jsonschema::Validator;

use crate::config::schema::ImportConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/import-config-v1.json");

/// Compiled once; a broken embedded schema is reported on every load.
static SCHEMA: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: serde_json::Value = serde_json::from_str(SCHEMA_JSON)
        .map_err(|e| format!("embedded config schema is not JSON: {}", e))?;
    jsonschema::validator_for(&schema)
        .map_err(|e| format!("embedded config schema does not compile: {}", e))
});

/// Reads and validates an import config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ImportConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&raw)
}

/// Parses `raw`, checks it against the schema, then applies the checks
/// the schema cannot express.
pub fn load_config_from_str(raw: &str) -> Result<ImportConfig, ConfigError> {
    let document: serde_json::Value = serde_json::from_str(raw)?;
    check_schema(&document)?;

    let config: ImportConfig = serde_json::from_value(document)?;
    check_semantics(&config)?;
    Ok(config)
}

fn check_schema(document: &serde_json::Value) -> Result<(), ConfigError> {
    let validator = SCHEMA.as_ref().map_err(|message| ConfigError::Validation {
        message: message.clone(),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(ConfigError::SchemaValidation {
        errors: errors.join("; "),
    })
}

fn invalid(field: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Validation {
        message: format!("{}: {}", field, reason),
    }
}

fn check_semantics(config: &ImportConfig) -> Result<(), ConfigError> {
    let folders = [
        ("images_folder", config.images_folder.as_str()),
        ("workspace_folder", config.workspace_folder.as_str()),
    ];
    for (field, name) in folders {
        let single = !name.trim().is_empty() && !name.contains(['/', '\\']);
        if !single || name == "." || name == ".." {
            return Err(invalid(field, format_args!("'{}' is not a single folder name", name)));
        }
    }
    if config.images_folder == config.workspace_folder {
        return Err(invalid("workspace_folder", "must differ from images_folder"));
    }

    let templates = [
        ("file_download_path", config.file_download_path.as_str()),
        ("file_render_path", config.file_render_path.as_str()),
    ];
    if let Some((field, _)) = templates.iter().find(|(_, t)| !t.contains("{file}")) {
        return Err(invalid(field, "missing the '{file}' placeholder"));
    }

    if config.progress_capacity == 0 {
        return Err(invalid("progress_capacity", "must be at least 1"));
    }
    Ok(())
}
