//! Runtime configuration.
//!
//! Configuration is read from an optional TOML file (path taken from
//! `CCNL_CONFIG`) and then overridden by individual environment
//! variables.  Every setting has a default, so the server starts with
//! no configuration at all.

use crate::calculator::PercentageRulePolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG: &str = "CCNL_CONFIG";
pub const ENV_BIND_ADDR: &str = "CCNL_BIND_ADDR";
pub const ENV_DATABASE: &str = "CCNL_DATABASE";
pub const ENV_SEED_DIR: &str = "CCNL_SEED_DIR";
pub const ENV_PERCENTAGE_RULES: &str = "CCNL_PERCENTAGE_RULES";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// SQLite database file; `:memory:` keeps the catalog in memory.
    pub database: PathBuf,
    /// Directory of JSON agreement definitions loaded at startup.
    pub seed_dir: Option<PathBuf>,
    /// Whether percentage-of-salary contribution rules count towards
    /// totals.
    pub percentage_rules: PercentageRulePolicy,
    /// Default `tracing` filter, used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database: PathBuf::from("ccnl.db"),
            seed_dir: Some(PathBuf::from("catalog")),
            percentage_rules: PercentageRulePolicy::Exclude,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit set of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = match vars.get(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(path))?,
            None => Self::default(),
        };
        config.apply_overrides(vars)?;
        Ok(config)
    }

    /// Parses a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        if let Some(addr) = vars.get(ENV_BIND_ADDR) {
            self.bind_addr = addr
                .parse()
                .with_context(|| format!("{ENV_BIND_ADDR} is not a socket address: {addr}"))?;
        }
        if let Some(db) = vars.get(ENV_DATABASE) {
            self.database = PathBuf::from(db);
        }
        if let Some(dir) = vars.get(ENV_SEED_DIR) {
            self.seed_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        if let Some(policy) = vars.get(ENV_PERCENTAGE_RULES) {
            self.percentage_rules = policy
                .parse::<PercentageRulePolicy>()
                .with_context(|| format!("invalid {ENV_PERCENTAGE_RULES}"))?;
        }
        Ok(())
    }

    /// Whether the catalog should live in memory only.
    pub fn in_memory(&self) -> bool {
        self.database.as_os_str() == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_variables() {
        let config = AppConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.in_memory());
    }

    #[test]
    fn file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ccnl.toml");
        fs::write(
            &path,
            r#"
bind_addr = "0.0.0.0:8080"
database = ":memory:"
percentage_rules = "include"
log_filter = "ccnl_engine=debug"
"#,
        )
        .unwrap();
        let config = AppConfig::from_vars(&vars(&[
            (ENV_CONFIG, path.to_str().unwrap()),
            (ENV_BIND_ADDR, "127.0.0.1:9000"),
            (ENV_SEED_DIR, ""),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert!(config.in_memory());
        assert_eq!(config.percentage_rules, PercentageRulePolicy::Include);
        assert_eq!(config.log_filter, "ccnl_engine=debug");
        assert_eq!(config.seed_dir, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_vars(&vars(&[(ENV_BIND_ADDR, "localhost")])).is_err());
        assert!(AppConfig::from_vars(&vars(&[(ENV_PERCENTAGE_RULES, "maybe")])).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(AppConfig::from_vars(&vars(&[(ENV_CONFIG, path.to_str().unwrap())])).is_err());
    }
}
