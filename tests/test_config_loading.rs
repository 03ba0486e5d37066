//! Tests for config file loading

use anyhow::Result;
use pinba_collector::config::{Config, ConfigError};
use pinba_collector::receiver::Endpoint;
use std::io::Write;
use tempfile::NamedTempFile;

/// Test loading from TOML file
#[test]
fn test_load_config_from_file() -> Result<()> {
    let mut temp_file = NamedTempFile::new()?;

    let config_content = r#"
[listen]
address = "127.0.0.1"
port = 30003

[[view]]
name = "search"
script = "/search.php"

[[view]]
name = "web2"
host = "web2"
"#;
    temp_file.write_all(config_content.as_bytes())?;
    temp_file.flush()?;

    let config = Config::load(temp_file.path())?;
    assert_eq!(config.endpoint(), Endpoint::new("127.0.0.1", 30003));

    let registry = config.registry_builder()?.finish();
    assert_eq!(registry.view_names(), vec!["total", "search", "web2"]);

    Ok(())
}

/// Test invalid TOML returns error
#[test]
fn test_invalid_toml_returns_error() -> Result<()> {
    let mut temp_file = NamedTempFile::new()?;
    temp_file.write_all(b"this is not valid TOML [[[")?;
    temp_file.flush()?;

    let err = Config::load(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().contains("failed to parse"));

    Ok(())
}

/// A bad view fails the whole file, not just that view
#[test]
fn test_view_without_name_is_rejected() -> Result<()> {
    let mut temp_file = NamedTempFile::new()?;
    temp_file.write_all(b"[[view]]\nname = \"\"\n")?;
    temp_file.flush()?;

    let err = Config::load(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::View(_)));

    Ok(())
}
