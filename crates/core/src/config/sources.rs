use std::fmt;

/// Where a configuration field got its value, as reported by `config_sources()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named `GROVE_*` variable
    EnvVar(String),
    /// Built-in default for the named field
    Default(String),
    /// YAML file at this path
    File(String),
    /// Set through a builder method
    Programmatic,
}

impl ConfigSource {
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ConfigSource::File(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "${}", var),
            ConfigSource::Default(field) => write!(f, "default for {}", field),
            ConfigSource::File(path) => write!(f, "file {}", path),
            ConfigSource::Programmatic => f.write_str("builder"),
        }
    }
}
