/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Default value used
    Default(String),
    /// Value derived from other fields
    Derived,
}

impl ConfigSource {
    /// Resolve the source of a field backed by `var`, falling back to `default`.
    pub fn for_env(var: &str, default: &str) -> Self {
        if std::env::var(var).is_ok() {
            ConfigSource::EnvVar(var.to_string())
        } else {
            ConfigSource::Default(default.to_string())
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "env:{}", var),
            ConfigSource::Default(value) => write!(f, "default({})", value),
            ConfigSource::Derived => write!(f, "derived"),
        }
    }
}
