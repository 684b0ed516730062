use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from environment variables or TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// DuckDB database file holding the signals table.
    /// If not set, an in-memory database is used.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Directory of hive-partitioned Parquet files (`run_date=YYYY-MM-DD/`).
    /// When set, the signals table is a view over this dataset.
    #[serde(default)]
    pub parquet_dir: Option<PathBuf>,
    /// Schema qualifying the signals table name.
    #[serde(default)]
    pub schema: Option<String>,
    /// Allowed CORS origin. If not set, any origin may read the API.
    #[serde(default)]
    pub cors_origin: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: 30).
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: None,
            parquet_dir: None,
            schema: None,
            cors_origin: None,
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `SIGNALS_HOST` → host
    /// - `SIGNALS_PORT` → port
    /// - `SIGNALS_DATABASE_PATH` → database_path
    /// - `SIGNALS_PARQUET_DIR` → parquet_dir
    /// - `SIGNALS_SCHEMA` → schema
    /// - `SIGNALS_CORS_ORIGIN` → cors_origin
    /// - `SIGNALS_REQUEST_TIMEOUT` → request_timeout_secs
    /// - `SIGNALS_SHUTDOWN_TIMEOUT` → shutdown_timeout_secs
    /// - `SIGNALS_LOG_JSON` → log_json
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        // Environment variable overrides
        if let Ok(host) = std::env::var("SIGNALS_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("SIGNALS_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(path) = std::env::var("SIGNALS_DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Ok(dir) = std::env::var("SIGNALS_PARQUET_DIR") {
            config.parquet_dir = Some(PathBuf::from(dir));
        }
        if let Ok(schema) = std::env::var("SIGNALS_SCHEMA") {
            config.schema = Some(schema).filter(|s| !s.is_empty());
        }
        if let Ok(origin) = std::env::var("SIGNALS_CORS_ORIGIN") {
            config.cors_origin = Some(origin);
        }
        if let Ok(val) = std::env::var("SIGNALS_REQUEST_TIMEOUT") {
            if let Ok(t) = val.parse() {
                config.request_timeout_secs = t;
            }
        }
        if let Ok(val) = std::env::var("SIGNALS_SHUTDOWN_TIMEOUT") {
            if let Ok(t) = val.parse() {
                config.shutdown_timeout_secs = t;
            }
        }
        if let Ok(val) = std::env::var("SIGNALS_LOG_JSON") {
            config.log_json = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Socket address string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that call `Config::load`, which reads environment
    /// variables shared by the whole test process.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert!(config.database_path.is_none());
        assert!(config.parquet_dir.is_none());
        assert!(config.schema.is_none());
        assert!(config.cors_origin.is_none());
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert!(!config.log_json);
    }

    #[test]
    fn test_load_from_toml() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        write!(
            file,
            r#"
host = "127.0.0.1"
port = 9000
database_path = "/var/lib/signals/warehouse.duckdb"
parquet_dir = "/var/lib/signals/parquet"
schema = "market"
cors_origin = "https://dashboard.example.com"
request_timeout_secs = 10
shutdown_timeout_secs = 5
log_json = true
"#
        )
        .unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/signals/warehouse.duckdb"))
        );
        assert_eq!(
            config.parquet_dir,
            Some(PathBuf::from("/var/lib/signals/parquet"))
        );
        assert_eq!(config.schema.as_deref(), Some("market"));
        assert_eq!(
            config.cors_origin.as_deref(),
            Some("https://dashboard.example.com")
        );
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.shutdown_timeout_secs, 5);
        assert!(config.log_json);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_load_no_path_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load(None);
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_bind_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_env_var_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();

        let orig_port = std::env::var("SIGNALS_PORT").ok();

        std::env::set_var("SIGNALS_PORT", "3000");
        let config = Config::load(None);
        assert_eq!(config.port, 3000);

        match orig_port {
            Some(v) => std::env::set_var("SIGNALS_PORT", v),
            None => std::env::remove_var("SIGNALS_PORT"),
        }
    }

    #[test]
    fn test_invalid_toml_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "this is not valid toml {{{").unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config.port, 8000);
    }
}
