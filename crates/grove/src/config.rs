//! Engine configuration
//!
//! Loaded from `GROVE_*` environment variables or a YAML file; every field
//! has a default so an empty environment yields a usable development setup.

use grove_core::{
    env_flag, env_parse, env_string, AppConfigTrait, ConfigError, ConfigSource, ConfigValidator,
    Environment, IdentifierValidator, RangeValidator,
};
use grove_orm::{LedgerTable, SequencerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration for the orchestration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroveConfig {
    pub environment: Environment,
    pub ledger_table: String,
    pub ledger_schema: Option<String>,
    /// Accept ledgers whose executed units are not a prefix of the sorted set
    pub allow_unordered: bool,
    pub blob_delete_batch_size: usize,
    pub blob_page_size: usize,
    pub kv_delete_batch_size: usize,
    pub kv_unprocessed_retries: usize,
    /// Prefix cleared by `reset`; the whole bucket when unset
    pub blob_reset_prefix: Option<String>,
    pub allow_destructive_in_production: bool,
    pub log_level: String,
    pub log_json: bool,

    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            ledger_table: LedgerTable::DEFAULT_TABLE.to_string(),
            ledger_schema: None,
            allow_unordered: false,
            blob_delete_batch_size: grove_storage::DEFAULT_MAX_DELETE_BATCH,
            blob_page_size: 1000,
            kv_delete_batch_size: grove_kv::DEFAULT_MAX_BATCH_DELETE,
            kv_unprocessed_retries: 3,
            blob_reset_prefix: None,
            allow_destructive_in_production: false,
            log_level: "info".to_string(),
            log_json: false,
            sources: HashMap::new(),
        }
    }
}

impl GroveConfig {
    /// Load from a YAML file. Fields absent from the file keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;

        let mapping: serde_yaml::Mapping = serde_yaml::from_str(&content).unwrap_or_default();
        for key in mapping.keys().filter_map(serde_yaml::Value::as_str) {
            config
                .sources
                .insert(key.to_string(), ConfigSource::File(path.display().to_string()));
        }
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self.sources.insert("environment".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self.sources.insert("ledger_table".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_blob_delete_batch_size(mut self, size: usize) -> Self {
        self.blob_delete_batch_size = size;
        self.sources
            .insert("blob_delete_batch_size".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_kv_delete_batch_size(mut self, size: usize) -> Self {
        self.kv_delete_batch_size = size;
        self.sources
            .insert("kv_delete_batch_size".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_blob_reset_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.blob_reset_prefix = Some(prefix.into());
        self.sources
            .insert("blob_reset_prefix".to_string(), ConfigSource::Programmatic);
        self
    }

    /// Let seed, setup and reset run against production
    pub fn allow_destructive_in_production(mut self, allow: bool) -> Self {
        self.allow_destructive_in_production = allow;
        self.sources.insert(
            "allow_destructive_in_production".to_string(),
            ConfigSource::Programmatic,
        );
        self
    }

    pub fn ledger(&self) -> LedgerTable {
        let ledger = LedgerTable::new(&self.ledger_table);
        match &self.ledger_schema {
            Some(schema) => ledger.with_schema(schema),
            None => ledger,
        }
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig::new(self.ledger()).allow_unordered(self.allow_unordered)
    }

    pub fn blob_clear_options(&self) -> grove_storage::ClearOptions {
        grove_storage::ClearOptions::default()
            .with_batch_size(self.blob_delete_batch_size)
            .with_page_size(self.blob_page_size)
    }

    pub fn kv_clear_options(&self) -> grove_kv::ClearOptions {
        grove_kv::ClearOptions::default()
            .with_page_size(self.kv_delete_batch_size)
            .with_max_unprocessed_retries(self.kv_unprocessed_retries)
    }

    /// Whether seed, setup and reset may run in the configured environment
    pub fn destructive_allowed(&self) -> bool {
        self.environment.is_safe_for_fixtures() || self.allow_destructive_in_production
    }
}

impl AppConfigTrait for GroveConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut sources = HashMap::new();

        if let Some(env) = env_parse::<Environment>(
            "GROVE_ENV",
            "environment",
            "development, testing, or production",
            &mut sources,
        )? {
            config.environment = env;
        }
        if let Some(table) = env_string("GROVE_LEDGER_TABLE", "ledger_table", &mut sources) {
            config.ledger_table = table;
        }
        config.ledger_schema = env_string("GROVE_LEDGER_SCHEMA", "ledger_schema", &mut sources);
        if let Some(flag) = env_flag("GROVE_ALLOW_UNORDERED", "allow_unordered", &mut sources)? {
            config.allow_unordered = flag;
        }
        if let Some(size) = env_parse(
            "GROVE_BLOB_BATCH_SIZE",
            "blob_delete_batch_size",
            "an integer",
            &mut sources,
        )? {
            config.blob_delete_batch_size = size;
        }
        if let Some(size) =
            env_parse("GROVE_BLOB_PAGE_SIZE", "blob_page_size", "an integer", &mut sources)?
        {
            config.blob_page_size = size;
        }
        if let Some(size) =
            env_parse("GROVE_KV_BATCH_SIZE", "kv_delete_batch_size", "an integer", &mut sources)?
        {
            config.kv_delete_batch_size = size;
        }
        if let Some(retries) =
            env_parse("GROVE_KV_RETRIES", "kv_unprocessed_retries", "an integer", &mut sources)?
        {
            config.kv_unprocessed_retries = retries;
        }
        config.blob_reset_prefix =
            env_string("GROVE_BLOB_RESET_PREFIX", "blob_reset_prefix", &mut sources);
        if let Some(flag) = env_flag(
            "GROVE_ALLOW_PRODUCTION_RESET",
            "allow_destructive_in_production",
            &mut sources,
        )? {
            config.allow_destructive_in_production = flag;
        }
        if let Some(level) = env_string("GROVE_LOG", "log_level", &mut sources) {
            config.log_level = level.to_lowercase();
        }
        if let Some(flag) = env_flag("GROVE_LOG_JSON", "log_json", &mut sources)? {
            config.log_json = flag;
        }

        config.sources = sources;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        IdentifierValidator::new("ledger_table").validate(self.ledger_table.as_str())?;
        if let Some(schema) = &self.ledger_schema {
            IdentifierValidator::new("ledger_schema").validate(schema.as_str())?;
        }

        RangeValidator::new("blob_delete_batch_size", 1, grove_storage::DEFAULT_MAX_DELETE_BATCH)
            .validate(&self.blob_delete_batch_size)?;
        RangeValidator::new("blob_page_size", 1, 1000).validate(&self.blob_page_size)?;
        RangeValidator::new("kv_delete_batch_size", 1, grove_kv::DEFAULT_MAX_BATCH_DELETE)
            .validate(&self.kv_delete_batch_size)?;

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid_value(
                "log_level",
                &self.log_level,
                LOG_LEVELS.join(", "),
            ));
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = self.sources.clone();
        for field in [
            "environment",
            "ledger_table",
            "allow_unordered",
            "blob_delete_batch_size",
            "blob_page_size",
            "kv_delete_batch_size",
            "kv_unprocessed_retries",
            "allow_destructive_in_production",
            "log_level",
            "log_json",
        ] {
            sources
                .entry(field.to_string())
                .or_insert_with(|| ConfigSource::Default(field.to_string()));
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "GROVE_ENV",
        "GROVE_LEDGER_TABLE",
        "GROVE_LEDGER_SCHEMA",
        "GROVE_ALLOW_UNORDERED",
        "GROVE_BLOB_BATCH_SIZE",
        "GROVE_BLOB_PAGE_SIZE",
        "GROVE_KV_BATCH_SIZE",
        "GROVE_KV_RETRIES",
        "GROVE_BLOB_RESET_PREFIX",
        "GROVE_ALLOW_PRODUCTION_RESET",
        "GROVE_LOG",
        "GROVE_LOG_JSON",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear_env();
        let config = GroveConfig::from_env().unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.ledger_table, "migrations");
        assert_eq!(config.blob_delete_batch_size, 1000);
        assert_eq!(config.kv_delete_batch_size, 25);
        assert!(config.config_sources()["ledger_table"].is_default());
        assert!(config.destructive_allowed());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("GROVE_ENV", "production");
        env::set_var("GROVE_LEDGER_TABLE", "grove_ledger");
        env::set_var("GROVE_KV_BATCH_SIZE", "10");
        env::set_var("GROVE_BLOB_RESET_PREFIX", "uploads/");

        let config = GroveConfig::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.ledger().table(), "grove_ledger");
        assert_eq!(config.kv_clear_options().page_size, 10);
        assert_eq!(config.blob_reset_prefix.as_deref(), Some("uploads/"));
        assert!(config.config_sources()["environment"].is_env_var());
        assert!(!config.destructive_allowed());
    }

    #[test]
    #[serial]
    fn test_env_rejects_out_of_range_batch() {
        clear_env();
        env::set_var("GROVE_KV_BATCH_SIZE", "26");
        let result = GroveConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validation_rejects_bad_identifiers_and_levels() {
        let mut config = GroveConfig::default();
        config.ledger_table = "migrations; drop".into();
        assert!(config.validate().is_err());

        let mut config = GroveConfig::default();
        config.log_level = "verbose".into();
        assert!(config.validate().is_err());

        let mut config = GroveConfig::default();
        config.blob_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.yaml");
        std::fs::write(
            &path,
            "environment: testing\nledger_table: schema_history\nallow_unordered: true\n",
        )
        .unwrap();

        let config = GroveConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.environment, Environment::Testing);
        assert_eq!(config.ledger_table, "schema_history");
        assert!(config.sequencer_config().allow_unordered);
        assert_eq!(config.blob_delete_batch_size, 1000);
        assert!(config.config_sources()["ledger_table"].is_file());
    }

    #[test]
    fn test_production_override() {
        let config = GroveConfig::default().with_environment(Environment::Production);
        assert!(!config.destructive_allowed());

        let config = config.allow_destructive_in_production(true);
        assert!(config.destructive_allowed());
        assert_eq!(
            config.config_sources()["allow_destructive_in_production"],
            ConfigSource::Programmatic
        );
    }

    #[test]
    fn test_builders_feed_derived_options() {
        let config = GroveConfig::default()
            .with_ledger_table("schema_history")
            .with_blob_delete_batch_size(5)
            .with_kv_delete_batch_size(10)
            .with_blob_reset_prefix("uploads/");

        assert!(config.validate().is_ok());
        assert_eq!(config.ledger().table(), "schema_history");
        assert_eq!(config.blob_clear_options().batch_size, 5);
        assert_eq!(config.kv_clear_options().page_size, 10);
        assert_eq!(config.blob_reset_prefix.as_deref(), Some("uploads/"));
        assert_eq!(config.config_sources()["ledger_table"], ConfigSource::Programmatic);
        assert!(config.config_sources()["log_level"].is_default());

        assert!(GroveConfig::default()
            .with_kv_delete_batch_size(26)
            .validate()
            .is_err());
    }
}
