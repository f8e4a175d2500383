//! Driver configuration.
//!
//! Built once and shared read-only through `Arc`. Values come from
//! `Default`, from serde (e.g. a config file section), or from the process
//! environment via [`DriverConfig::from_env`].

use serde::{Deserialize, Serialize};

/// Connection and synthesis settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Database name (`DB`).
    pub db_name: String,
    /// Server URL (`URL`).
    pub url: String,
    /// Drop and recreate the database during setup (`DROP`).
    pub drop: bool,
    /// Skip existence and cardinality checks on new edges (`DISABLE_EDGE_VALIDATION`).
    pub disable_edge_validation: bool,
    /// Skip every directive constraint check (`DISABLE_DIRECTIVES_CHECKING`).
    pub disable_directives_checking: bool,
    /// Memoize existence checks within a request (`CACHE`).
    pub exists_cache: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            db_name: "dev-db".into(),
            url: "http://localhost:8529".into(),
            drop: false,
            disable_edge_validation: false,
            disable_directives_checking: false,
            exists_cache: true,
        }
    }
}

impl DriverConfig {
    /// Read settings from the environment; unset variables keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| lookup(key).map_or(default, |v| parse_flag(&v));
        Self {
            db_name: lookup("DB").unwrap_or(defaults.db_name),
            url: lookup("URL").unwrap_or(defaults.url),
            drop: flag("DROP", defaults.drop),
            disable_edge_validation: flag("DISABLE_EDGE_VALIDATION", defaults.disable_edge_validation),
            disable_directives_checking: flag("DISABLE_DIRECTIVES_CHECKING", defaults.disable_directives_checking),
            exists_cache: flag("CACHE", defaults.exists_cache),
        }
    }

    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_drop(mut self, drop: bool) -> Self {
        self.drop = drop;
        self
    }

    pub fn with_edge_validation(mut self, enabled: bool) -> Self {
        self.disable_edge_validation = !enabled;
        self
    }

    pub fn with_directives_checking(mut self, enabled: bool) -> Self {
        self.disable_directives_checking = !enabled;
        self
    }

    pub fn with_exists_cache(mut self, enabled: bool) -> Self {
        self.exists_cache = enabled;
        self
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
