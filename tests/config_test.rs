use secrecy::ExposeSecret;
use std::io::Write;
use tempfile::NamedTempFile;
use toolrelay::config::Config;
use toolrelay::registry::ServerRegistry;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_with_log_level_override() {
    let file = write_config(
        r#"
logging:
  level: warn
servers:
  - name: docs
    command: docs-server
"#,
    );

    let config = Config::load(file.path(), None).unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, "text");

    let config = Config::load(file.path(), Some("debug".to_string())).unwrap();
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("absent.yaml"), None);
    assert!(result.is_err());
}

#[test]
fn test_invalid_config_is_rejected_on_load() {
    let file = write_config(
        r#"
servers:
  - name: data
    command: a
  - name: data
    command: b
"#,
    );
    let error = Config::load(file.path(), None).unwrap_err();
    assert!(error.to_string().contains("Duplicate server name"));

    let file = write_config("servers: [ this is not : valid");
    assert!(Config::load(file.path(), None).is_err());
}

#[test]
fn test_credentials_resolve_from_environment() {
    std::env::set_var("TOOLRELAY_CONFIG_TEST_DATA_KEY", "from-env");
    let config = Config::from_yaml(
        r#"
servers:
  - name: data
    api_url: https://data.example/rpc
    api_key: ${TOOLRELAY_CONFIG_TEST_DATA_KEY}
  - name: ops
    api_url: https://ops.example/rpc
    api_key: ${TOOLRELAY_CONFIG_TEST_UNSET_KEY}
"#,
    )
    .unwrap();

    let data = &config.servers[0];
    assert_eq!(data.api_key.as_ref().unwrap().expose_secret(), "from-env");
    assert!(data.has_credentials());

    // unresolved credentials count as missing, so the server is skipped
    let ops = &config.servers[1];
    assert!(ops.api_key.is_none());
    assert!(!ops.has_credentials());

    let registry = ServerRegistry::load(&config);
    assert_eq!(registry.names(), vec!["data".to_string()]);
}

#[test]
fn test_registry_skips_unusable_servers() {
    let config = Config::from_yaml(
        r#"
servers:
  - name: docs
    command: docs-server
  - name: legacy
    command: legacy-server
    enabled: false
  - name: nowhere
    require_api_key: false
"#,
    )
    .unwrap();
    config.validate().unwrap();

    let registry = ServerRegistry::load(&config);
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("docs"));
    assert!(registry.lookup("legacy").is_err());
    assert!(registry.lookup("nowhere").is_err());
}

#[test]
fn test_overrides_apply_over_file_values() {
    let mut config = Config::from_yaml("manager:\n  cache_max_size: 10\n").unwrap();
    config
        .apply_overrides_from(|key| match key {
            "TOOLRELAY_CACHE_MAX_SIZE" => Some("25".to_string()),
            "TOOLRELAY_LLM_PROVIDER" => Some("anthropic".to_string()),
            "TOOLRELAY_LLM_MODEL" => Some("claude-test".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.manager.cache_max_size, 25);
    let llm = config.llm.unwrap();
    assert_eq!(llm.provider, "anthropic");
    assert_eq!(llm.model, "claude-test");

    let mut config = Config::default();
    let result = config.apply_overrides_from(|key| {
        (key == "TOOLRELAY_HEALTH_INTERVAL").then(|| "soon".to_string())
    });
    assert!(result.is_err());
}
