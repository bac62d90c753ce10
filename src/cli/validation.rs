//! CLI argument validation functions
//!
//! This module provides custom validation functions for CLI arguments
//! that go beyond what clap can validate automatically.

use std::fs;
use std::path::PathBuf;

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    // Check if file exists
    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }

    // Check if it's a file (not a directory)
    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    // Check if file is readable
    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!("Cannot read configuration file '{}': {}", path_str, e)),
    }
}

/// Parse a `key=value` data entry
pub fn validate_data_pair(pair: &str) -> Result<(String, String), String> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("Data entry must look like key=value, got: '{}'", pair))?;

    let key = key.trim();
    if key.is_empty() {
        return Err("Data key cannot be empty".to_string());
    }

    Ok((key.to_string(), value.to_string()))
}

/// Validate a topic name as FCM accepts it: `[a-zA-Z0-9-_.~%]+`, optionally
/// prefixed with `/topics/`
pub fn validate_topic_name(topic: &str) -> Result<String, String> {
    let name = topic.strip_prefix("/topics/").unwrap_or(topic);

    if name.is_empty() {
        return Err("Topic name cannot be empty".to_string());
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "-_.~%".contains(*c)))
    {
        return Err(format!(
            "Topic name may only contain letters, digits and -_.~%, found '{}'",
            bad
        ));
    }

    Ok(topic.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_must_exist() {
        assert!(validate_config_file_path("/definitely/not/here.toml").is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(validate_config_file_path(path).unwrap(), PathBuf::from(path));
    }

    #[test]
    fn test_config_path_rejects_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = validate_config_file_path(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.contains("not a file"));
    }

    #[test]
    fn test_data_pair() {
        assert_eq!(
            validate_data_pair("episodeId=42").unwrap(),
            ("episodeId".to_string(), "42".to_string())
        );
        // Only the first '=' splits
        assert_eq!(
            validate_data_pair("url=/e?id=1").unwrap(),
            ("url".to_string(), "/e?id=1".to_string())
        );
        assert!(validate_data_pair("novalue").is_err());
        assert!(validate_data_pair("=x").is_err());
    }

    #[test]
    fn test_topic_name() {
        assert!(validate_topic_name("news").is_ok());
        assert!(validate_topic_name("/topics/news-2024_v1.0~%").is_ok());
        assert!(validate_topic_name("/topics/").is_err());
        assert!(validate_topic_name("bad topic").is_err());
    }
}
