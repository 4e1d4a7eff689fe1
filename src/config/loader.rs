//! Reads the user config file named by `NRDOT_CONFIG` off disk, applying the
//! `NEW_RELIC_LICENSE_KEY` environment override before the bytes ever reach
//! the validator.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("could not read '{path}': {source}")]
    Read { path: String, source: std::io::Error },
    #[error("'{path}' is not a valid YAML document: {source}")]
    Parse { path: String, source: serde_yaml::Error },
}

/// Reads `path` and, if `license_key_override` is set, rewrites the
/// document's top-level `license_key` field to that value before returning
/// the bytes. The override always wins over whatever the file contains,
/// matching the environment variable's documented precedence.
pub fn load_raw_config(path: &Path, license_key_override: Option<&str>) -> Result<Vec<u8>, ConfigLoadError> {
    let raw = std::fs::read(path).map_err(|source| ConfigLoadError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let Some(license_key) = license_key_override else {
        return Ok(raw);
    };

    let mut document: serde_yaml::Value = serde_yaml::from_slice(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(mapping) = document.as_mapping_mut() {
        mapping.insert(
            serde_yaml::Value::String("license_key".to_string()),
            serde_yaml::Value::String(license_key.to_string()),
        );
    }

    let rewritten = serde_yaml::to_string(&document).map_err(|source| ConfigLoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(rewritten.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_file_unchanged_without_an_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "service:\n  name: svc\nlicense_key: 0123456789abcdef0123456789abcdef\n").unwrap();

        let raw = load_raw_config(&path, None).unwrap();
        assert_eq!(raw, std::fs::read(&path).unwrap());
    }

    #[test]
    fn license_key_override_replaces_the_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "service:\n  name: svc\nlicense_key: fromfile0000000000000000000000\n").unwrap();

        let raw = load_raw_config(&path, Some("fromenv00000000000000000000000000")).unwrap();
        let document: serde_yaml::Value = serde_yaml::from_slice(&raw).unwrap();
        assert_eq!(
            document.get("license_key").and_then(serde_yaml::Value::as_str),
            Some("fromenv00000000000000000000000000")
        );
    }

    #[test]
    fn license_key_override_is_inserted_even_when_the_file_omits_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "service:\n  name: svc\n").unwrap();

        let raw = load_raw_config(&path, Some("fromenv00000000000000000000000000")).unwrap();
        let document: serde_yaml::Value = serde_yaml::from_slice(&raw).unwrap();
        assert_eq!(
            document.get("license_key").and_then(serde_yaml::Value::as_str),
            Some("fromenv00000000000000000000000000")
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.yaml");
        assert!(matches!(load_raw_config(&path, None), Err(ConfigLoadError::Read { .. })));
    }
}
