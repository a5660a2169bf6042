// Executor configuration
#![allow(dead_code)]

use crate::executor::error::{ExecutorError, Result};
use crate::executor::types::ExecutionConstraints;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Named options passed to a plugin at construction
pub type PluginOptions = HashMap<String, Value>;

/// Option names forwarded to the base configuration
pub const BASE_OPTION_KEYS: [&str; 5] = [
    "log_stdout",
    "log_stderr",
    "conda_env",
    "cache_dir",
    "current_env_on_conda_fail",
];

/// Configuration shared by every executor plugin
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseExecutorConfig {
    /// File that captured stdout is appended to
    pub log_stdout: Option<PathBuf>,
    /// File that captured stderr is appended to
    pub log_stderr: Option<PathBuf>,
    /// Conda environment the task should run in
    pub conda_env: Option<String>,
    /// Cache directory for intermediate files
    pub cache_dir: PathBuf,
    /// Run in the current environment when the conda environment is unavailable
    pub current_env_on_conda_fail: bool,
}

impl Default for BaseExecutorConfig {
    fn default() -> Self {
        Self {
            log_stdout: None,
            log_stderr: None,
            conda_env: None,
            cache_dir: default_cache_dir(),
            current_env_on_conda_fail: false,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("executor-template"))
        .unwrap_or_else(|| PathBuf::from(".cache/executor-template"))
}

impl BaseExecutorConfig {
    /// Split options into the base configuration and the remaining extras
    ///
    /// Allow-listed keys are parsed into typed fields; every other key is
    /// returned untouched.
    pub fn split_options(options: PluginOptions) -> Result<(Self, PluginOptions)> {
        let mut base = serde_json::Map::new();
        let mut extra = PluginOptions::new();

        for (key, value) in options {
            if BASE_OPTION_KEYS.contains(&key.as_str()) {
                // null means "not set", as with an omitted key
                if !value.is_null() {
                    base.insert(key, value);
                }
            } else {
                extra.insert(key, value);
            }
        }

        let keys: Vec<String> = base.keys().cloned().collect();
        let mut config: Self = serde_json::from_value(Value::Object(base))
            .map_err(|e| ExecutorError::InvalidOption(keys.join(","), e.to_string()))?;

        // Empty paths disable stream logging
        config.log_stdout = config.log_stdout.filter(|p| !p.as_os_str().is_empty());
        config.log_stderr = config.log_stderr.filter(|p| !p.as_os_str().is_empty());
        config.conda_env = config.conda_env.filter(|e| !e.is_empty());

        debug!(
            forwarded = ?keys,
            extra_count = extra.len(),
            "split executor options"
        );

        Ok((config, extra))
    }
}

/// Parse an environment variable, logging a warning if the value is present but invalid.
fn parse_env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %v, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl ExecutionConstraints {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut constraints = ExecutionConstraints::default();

        constraints.timeout_secs = parse_env_var("EXECUTOR_TIMEOUT_SECS", constraints.timeout_secs);
        constraints.max_output_bytes =
            parse_env_var("EXECUTOR_MAX_OUTPUT_BYTES", constraints.max_output_bytes);

        constraints
    }
}

/// Load plugin options from a TOML config file
///
/// Options for a plugin live in a table named after it. A missing file or
/// missing table yields no options.
pub fn load_plugin_options(path: &Path, plugin_name: &str) -> Result<PluginOptions> {
    if !path.exists() {
        debug!(path = %path.display(), "executor config not found, using defaults");
        return Ok(PluginOptions::new());
    }

    let content = std::fs::read_to_string(path)?;
    let config: toml::Table = toml::from_str(&content)?;

    let mut options = PluginOptions::new();

    if let Some(table) = config.get(plugin_name).and_then(|v| v.as_table()) {
        for (key, value) in table {
            options.insert(key.clone(), serde_json::to_value(value)?);
        }
    }

    debug!(
        path = %path.display(),
        plugin = plugin_name,
        option_count = options.len(),
        "loaded plugin options from config"
    );
    Ok(options)
}

/// Layer options: later maps override earlier ones
pub fn merge_options(layers: impl IntoIterator<Item = PluginOptions>) -> PluginOptions {
    layers.into_iter().fold(PluginOptions::new(), |mut acc, layer| {
        acc.extend(layer);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn options(pairs: &[(&str, Value)]) -> PluginOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_split_forwards_only_known_keys() {
        let (base, extra) = BaseExecutorConfig::split_options(options(&[
            ("kwarg", json!("custom param")),
            ("current_env_on_conda_fail", json!(true)),
            ("conda_env", json!("py39")),
            ("retries", json!(3)),
        ]))
        .unwrap();

        assert!(base.current_env_on_conda_fail);
        assert_eq!(base.conda_env.as_deref(), Some("py39"));
        assert_eq!(extra.len(), 2);
        assert_eq!(extra["kwarg"], json!("custom param"));
        assert_eq!(extra["retries"], json!(3));
    }

    #[test]
    fn test_split_defaults() {
        let (base, extra) = BaseExecutorConfig::split_options(PluginOptions::new()).unwrap();
        assert_eq!(base, BaseExecutorConfig::default());
        assert!(extra.is_empty());
    }

    #[test]
    fn test_split_empty_log_paths_disable_logging() {
        let (base, _) = BaseExecutorConfig::split_options(options(&[
            ("log_stdout", json!("")),
            ("log_stderr", json!("/tmp/err.log")),
            ("conda_env", Value::Null),
        ]))
        .unwrap();

        assert!(base.log_stdout.is_none());
        assert_eq!(base.log_stderr, Some(PathBuf::from("/tmp/err.log")));
        assert!(base.conda_env.is_none());
    }

    #[test]
    fn test_split_rejects_mistyped_known_key() {
        let result = BaseExecutorConfig::split_options(options(&[(
            "current_env_on_conda_fail",
            json!("yes please"),
        )]));
        assert!(matches!(result, Err(ExecutorError::InvalidOption(..))));
    }

    #[test]
    fn test_load_plugin_options() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[CustomExecutor]
executor_input1 = "from-file"
executor_input2 = 7
cache_dir = "/tmp/cache"

[OtherExecutor]
ignored = true
"#
        )
        .unwrap();

        let options = load_plugin_options(file.path(), "CustomExecutor").unwrap();
        assert_eq!(options.len(), 3);
        assert_eq!(options["executor_input1"], json!("from-file"));
        assert_eq!(options["executor_input2"], json!(7));

        let missing = load_plugin_options(file.path(), "NoSuchExecutor").unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_load_plugin_options_missing_file() {
        let path = Path::new("/nonexistent/executors.toml");
        let options = load_plugin_options(path, "CustomExecutor").unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn test_merge_options_later_wins() {
        let merged = merge_options([
            options(&[("a", json!(1)), ("b", json!(1))]),
            options(&[("b", json!(2))]),
        ]);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(2));
    }
}
