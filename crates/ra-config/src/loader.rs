//! Loading `rooms.yaml`
//!
//! Supports one custom tag:
//! - `!env_var VAR` - Environment variable substitution

use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, info, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::rooms::RoomsConfig;

/// Load, resolve and validate a rooms file
///
/// A relative `storage_dir` is taken relative to the file's directory.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<RoomsConfig> {
    let path = path.as_ref();
    debug!("Loading configuration file: {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse_config(&content, path)?;
    if config.storage_dir.is_relative() {
        if let Some(dir) = path.parent() {
            config.storage_dir = dir.join(&config.storage_dir);
        }
    }

    info!(
        rooms = config.rooms.len(),
        storage_dir = %config.storage_dir.display(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse and validate rooms YAML; `source_path` is only used in errors
pub fn parse_config(content: &str, source_path: &Path) -> ConfigResult<RoomsConfig> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: source_path.to_path_buf(),
        source: e,
    })?;
    let value = process_value(value)?;

    let config: RoomsConfig =
        serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;
    config.validate()?;
    Ok(config)
}

/// Process a YAML value, handling custom tags
fn process_value(value: Value) -> ConfigResult<Value> {
    match value {
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            trace!("Processing tag '{}' with value {:?}", tag, tagged.value);
            match tag.as_str() {
                "!env_var" => process_env_var(tagged.value),
                _ => Err(ConfigError::InvalidValue {
                    key: tag,
                    reason: "unsupported tag".to_string(),
                }),
            }
        }
        Value::Mapping(map) => {
            let mut result = serde_yaml::Mapping::new();
            for (k, v) in map {
                result.insert(process_value(k)?, process_value(v)?);
            }
            Ok(Value::Mapping(result))
        }
        Value::Sequence(seq) => {
            let result: ConfigResult<Vec<Value>> = seq.into_iter().map(process_value).collect();
            Ok(Value::Sequence(result?))
        }
        _ => Ok(value),
    }
}

/// Process !env_var tag
fn process_env_var(value: Value) -> ConfigResult<Value> {
    let var_name = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            })
        }
    };

    let env_value = std::env::var(&var_name).map_err(|_| ConfigError::EnvVarNotFound {
        var: var_name.clone(),
    })?;

    debug!("Substituted env var: {}", var_name);
    Ok(Value::String(env_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RA_TEST_SERVICE_ACCOUNT", "svc-1234");
        let config = parse_config(
            "service_account_id: !env_var RA_TEST_SERVICE_ACCOUNT\n",
            Path::new("rooms.yaml"),
        )
        .unwrap();
        assert_eq!(config.service_account_id, "svc-1234");
    }

    #[test]
    fn test_missing_env_var() {
        let result = parse_config(
            "service_account_id: !env_var RA_TEST_SURELY_NOT_SET_42\n",
            Path::new("rooms.yaml"),
        );
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_unknown_tag() {
        let result = parse_config("log_level: !secret level\n", Path::new("rooms.yaml"));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let err = parse_config("rooms: [", Path::new("/etc/ra/rooms.yaml")).unwrap_err();
        match err {
            ConfigError::ParseYaml { path, .. } => {
                assert_eq!(path, PathBuf::from("/etc/ra/rooms.yaml"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
