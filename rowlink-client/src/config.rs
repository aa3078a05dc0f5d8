use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use rowlink_cache::{CacheConfig, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};

/// Environment variables overlaid on file configuration, and the keys they set.
const ENV_KEYS: &[(&str, &str)] = &[
    ("ROWLINK_URL", "rowlink.url"),
    ("ROWLINK_SCHEMA", "rowlink.schema"),
    ("ROWLINK_API_KEY", "rowlink.api_key"),
    ("ROWLINK_TIMEOUT_MS", "rowlink.timeout_ms"),
    ("ROWLINK_CACHE_TTL_SECS", "rowlink.cache.ttl_secs"),
    ("ROWLINK_CACHE_MAX_ENTRIES", "rowlink.cache.max_entries"),
];

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// A required key is missing.
    NotFound(String),
    /// An I/O or YAML parsing error occurred while loading configuration.
    Load(String),
    /// A key is present but its value is unusable.
    Invalid { key: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Connection settings for a [`Client`](crate::Client).
///
/// Can be built in code:
///
/// ```ignore
/// let config = ClientConfig::new("http://localhost:3000")
///     .with_schema("api")
///     .with_timeout(Duration::from_secs(5))
///     .with_cache(CacheConfig::new(Duration::from_secs(30), 500));
/// ```
///
/// or loaded from a `rowlink:` YAML section:
///
/// ```yaml
/// rowlink:
///   url: http://localhost:3000
///   schema: api
///   api_key: anon-key
///   timeout_ms: 5000
///   headers:
///     x-client-info: my-app
///   cache:
///     ttl_secs: 30
///     max_entries: 500
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the REST interface, e.g. `http://localhost:3000`.
    pub url: String,
    pub schema: Option<String>,
    /// Sent as the `apikey` header and, without another credential
    /// provider, as the bearer token.
    pub api_key: Option<String>,
    /// Default per-request timeout, overridable per query.
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
    /// `None` disables result caching.
    pub cache: Option<CacheConfig>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("schema", &self.schema)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field(
                "headers",
                &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            schema: None,
            api_key: None,
            timeout: None,
            headers: Vec::new(),
            cache: None,
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parses the `rowlink:` section of a YAML document. Environment
    /// variables are not consulted.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        load_yaml_str(yaml, &mut values)?;
        Self::from_values(&values)
    }

    /// Loads configuration with the following precedence (lowest first):
    ///
    /// 1. the YAML file at `path`, if it exists
    /// 2. a `.env` file (never overwriting variables already set)
    /// 3. `ROWLINK_*` environment variables
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        load_yaml_file(path.as_ref(), &mut values)?;

        let _ = dotenvy::dotenv();

        for (env_key, config_key) in ENV_KEYS {
            if let Ok(value) = std::env::var(env_key) {
                values.insert((*config_key).to_string(), value);
            }
        }
        Self::from_values(&values)
    }

    fn from_values(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let url = values
            .get("rowlink.url")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::NotFound("rowlink.url".to_string()))?;
        let mut config = ClientConfig::new(url.trim());

        config.schema = values.get("rowlink.schema").cloned();
        config.api_key = values.get("rowlink.api_key").cloned();
        config.timeout = parse_u64(values, "rowlink.timeout_ms")?.map(Duration::from_millis);

        let mut headers: Vec<(String, String)> = values
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("rowlink.headers.")
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect();
        headers.sort();
        config.headers = headers;

        let enabled = match values.get("rowlink.cache.enabled") {
            Some(raw) => Some(raw.parse::<bool>().map_err(|e| ConfigError::Invalid {
                key: "rowlink.cache.enabled".to_string(),
                message: e.to_string(),
            })?),
            None => None,
        };
        let ttl = parse_u64(values, "rowlink.cache.ttl_secs")?;
        let max_entries = parse_u64(values, "rowlink.cache.max_entries")?;
        let wants_cache = enabled.unwrap_or(ttl.is_some() || max_entries.is_some());
        if wants_cache {
            let max_entries = match max_entries {
                Some(n) => usize::try_from(n).map_err(|e| ConfigError::Invalid {
                    key: "rowlink.cache.max_entries".to_string(),
                    message: e.to_string(),
                })?,
                None => DEFAULT_MAX_ENTRIES,
            };
            config.cache = Some(CacheConfig::new(
                ttl.map(Duration::from_secs).unwrap_or(DEFAULT_TTL),
                max_entries,
            ));
        }
        Ok(config)
    }
}

fn parse_u64(values: &HashMap<String, String>, key: &str) -> Result<Option<u64>, ConfigError> {
    match values.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(None),
    }
}

fn load_yaml_file(path: &Path, values: &mut HashMap<String, String>) -> Result<(), ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        load_yaml_str(&content, values)?;
    }
    Ok(())
}

fn load_yaml_str(content: &str, values: &mut HashMap<String, String>) -> Result<(), ConfigError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten_yaml("", &yaml, values);
    Ok(())
}

/// Flattens a YAML tree into dot-separated keys with string leaves.
fn flatten_yaml(prefix: &str, value: &serde_yaml::Value, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => scalar_to_string(other).unwrap_or_else(|| format!("{other:?}")),
                };
                let full_key = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_yaml(&full_key, v, out);
            }
        }
        leaf => {
            if prefix.is_empty() {
                return;
            }
            if let Some(s) = scalar_to_string(leaf) {
                out.insert(prefix.to_string(), s);
            }
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    const YAML: &str = r#"
rowlink:
  url: http://localhost:3000
  schema: api
  api_key: secret
  timeout_ms: 2500
  headers:
    x-client-info: tests
  cache:
    ttl_secs: 30
    max_entries: 200
other:
  ignored: true
"#;

    fn clear_env() {
        for (key, _) in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn parses_yaml_section() {
        let config = ClientConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.url, "http://localhost:3000");
        assert_eq!(config.schema.as_deref(), Some("api"));
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(
            config.headers,
            vec![("x-client-info".to_string(), "tests".to_string())]
        );
        let cache = config.cache.unwrap();
        assert_eq!(cache.ttl, Duration::from_secs(30));
        assert_eq!(cache.max_entries, 200);
    }

    #[test]
    fn missing_url_is_not_found() {
        let err = ClientConfig::from_yaml_str("rowlink:\n  schema: api\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(ref k) if k == "rowlink.url"));
    }

    #[test]
    fn bad_number_is_invalid() {
        let err =
            ClientConfig::from_yaml_str("rowlink:\n  url: http://x\n  timeout_ms: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "rowlink.timeout_ms"));
    }

    #[test]
    fn cache_can_be_disabled() {
        let yaml = "rowlink:\n  url: http://x\n  cache:\n    enabled: false\n    ttl_secs: 5\n";
        assert!(ClientConfig::from_yaml_str(yaml).unwrap().cache.is_none());
        let yaml = "rowlink:\n  url: http://x\n  cache:\n    enabled: true\n";
        let cache = ClientConfig::from_yaml_str(yaml).unwrap().cache.unwrap();
        assert_eq!(cache.ttl, DEFAULT_TTL);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ClientConfig::new("http://x").with_api_key("super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    #[serial]
    fn load_overlays_environment() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        std::env::set_var("ROWLINK_SCHEMA", "public");
        std::env::set_var("ROWLINK_CACHE_MAX_ENTRIES", "10");
        let config = ClientConfig::load(file.path()).unwrap();
        clear_env();

        assert_eq!(config.url, "http://localhost:3000");
        assert_eq!(config.schema.as_deref(), Some("public"));
        assert_eq!(config.cache.unwrap().max_entries, 10);
    }

    #[test]
    #[serial]
    fn load_without_file_uses_environment() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("ROWLINK_URL", "http://db.internal:3000");
        std::env::set_var("ROWLINK_TIMEOUT_MS", "100");
        let config = ClientConfig::load(dir.path().join("missing.yaml")).unwrap();
        clear_env();

        assert_eq!(config.url, "http://db.internal:3000");
        assert_eq!(config.timeout, Some(Duration::from_millis(100)));
        assert!(config.cache.is_none());
    }
}
