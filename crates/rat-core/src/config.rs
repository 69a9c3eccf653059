//! Connection and resource configuration, loaded from environment variables.
//!
//! `S3Config`, `EngineConfig`, and `NessieConfig` are shared verbatim between
//! the runner and the query service — both services must resolve the same
//! bucket, catalog, and resource limits.

use std::collections::HashMap;
use std::env;

use crate::error::ConfigError;

/// S3/MinIO connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub use_ssl: bool,
    pub session_token: String,
    pub region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "minio:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: "rat".to_string(),
            use_ssl: false,
            session_token: String::new(),
            region: "us-east-1".to_string(),
        }
    }
}

impl S3Config {
    /// Build from environment variables. Fails fast when credentials are
    /// absent — they must never fall back to a hardcoded default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_key = env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret_key = env::var("S3_SECRET_KEY").unwrap_or_default();
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(ConfigError::MissingEnv("S3_ACCESS_KEY / S3_SECRET_KEY"));
        }
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").unwrap_or_else(|_| "minio:9000".to_string()),
            access_key,
            secret_key,
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "rat".to_string()),
            use_ssl: env::var("S3_USE_SSL")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            session_token: env::var("S3_SESSION_TOKEN").unwrap_or_default(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }

    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }

    /// Apply per-run credential overrides (e.g. short-lived STS tokens
    /// handed to a single run) on top of the process-wide config. Unlike
    /// `from_env`, this never touches `std::env` — `env::set_var` is
    /// process-global and unsafe to use across concurrently executing
    /// runs with different credentials.
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> Self {
        let mut cfg = self.clone();
        if let Some(v) = overrides.get("S3_ENDPOINT") {
            cfg.endpoint = v.clone();
        }
        if let Some(v) = overrides.get("S3_ACCESS_KEY") {
            cfg.access_key = v.clone();
        }
        if let Some(v) = overrides.get("S3_SECRET_KEY") {
            cfg.secret_key = v.clone();
        }
        if let Some(v) = overrides.get("S3_SESSION_TOKEN") {
            cfg.session_token = v.clone();
        }
        if let Some(v) = overrides.get("S3_BUCKET") {
            cfg.bucket = v.clone();
        }
        if let Some(v) = overrides.get("S3_REGION") {
            cfg.region = v.clone();
        }
        if let Some(v) = overrides.get("S3_USE_SSL") {
            cfg.use_ssl = v.eq_ignore_ascii_case("true");
        }
        cfg
    }
}

/// Resource limits for the embedded analytical engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub memory_limit: String,
    pub threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: "2GB".to_string(),
            threads: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_threads = env::var("ENGINE_THREADS").unwrap_or_else(|_| "4".to_string());
        let threads: i64 = raw_threads
            .parse()
            .map_err(|_| ConfigError::InvalidInt("ENGINE_THREADS", raw_threads.clone()))?;
        if threads < 1 {
            return Err(ConfigError::NotPositive("ENGINE_THREADS", threads));
        }
        Ok(Self {
            memory_limit: env::var("ENGINE_MEMORY_LIMIT").unwrap_or_else(|_| "2GB".to_string()),
            threads: threads as usize,
        })
    }
}

/// Nessie catalog connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NessieConfig {
    pub url: String,
}

impl Default for NessieConfig {
    fn default() -> Self {
        Self {
            url: "http://nessie:19120/api/v1".to_string(),
        }
    }
}

impl NessieConfig {
    pub fn from_env() -> Self {
        Self {
            url: env::var("NESSIE_URL").unwrap_or_else(|_| "http://nessie:19120/api/v1".to_string()),
        }
    }

    /// Strip known API suffixes to get the bare Nessie host URL.
    fn host_url(&self) -> String {
        let mut url = self.url.trim_end_matches('/').to_string();
        for suffix in ["/api/v1", "/api/v2", "/iceberg"] {
            if let Some(stripped) = url.strip_suffix(suffix) {
                url = stripped.to_string();
                break;
            }
        }
        url
    }

    /// Nessie Iceberg REST catalog URI (e.g. `http://nessie:19120/iceberg`).
    pub fn base_url(&self) -> String {
        format!("{}/iceberg", self.host_url())
    }

    /// Nessie v2 REST API base URL for branch lifecycle + table discovery.
    pub fn api_v2_url(&self) -> String {
        format!("{}/api/v2", self.host_url())
    }
}

/// Process-wide configuration for the runner server.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub state_dir: String,
    pub max_concurrent_runs: usize,
    pub worker_pool_size: usize,
    pub run_ttl_seconds: u64,
    pub callback_base_url: Option<String>,
    pub grpc_port: u16,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

pub const DEFAULT_STATE_DIR: &str = "/tmp/rat-runner-state";
const DEFAULT_RUN_TTL_SECONDS: u64 = 3600;
const DEFAULT_MAX_CONCURRENT_RUNS: usize = 10;
const DEFAULT_GRPC_WORKERS: usize = 10;

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            state_dir: DEFAULT_STATE_DIR.to_string(),
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
            worker_pool_size: DEFAULT_GRPC_WORKERS,
            run_ttl_seconds: DEFAULT_RUN_TTL_SECONDS,
            callback_base_url: None,
            grpc_port: 50052,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cert_path = env::var("GRPC_TLS_CERT").ok().filter(|s| !s.is_empty());
        let key_path = env::var("GRPC_TLS_KEY").ok().filter(|s| !s.is_empty());
        if cert_path.is_some() != key_path.is_some() {
            return Err(ConfigError::IncompleteTlsPair);
        }

        let run_ttl_seconds = env::var("RUN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RUN_TTL_SECONDS);
        let max_concurrent_runs = env::var("MAX_CONCURRENT_RUNS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT_RUNS);
        let worker_pool_size = env::var("GRPC_MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_GRPC_WORKERS);
        let grpc_port = env::var("GRPC_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50052);

        Ok(Self {
            state_dir: env::var("RUNNER_STATE_DIR").unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string()),
            max_concurrent_runs,
            worker_pool_size,
            run_ttl_seconds,
            callback_base_url: env::var("RATD_CALLBACK_URL").ok().filter(|s| !s.is_empty()),
            grpc_port,
            tls_cert_path: cert_path,
            tls_key_path: key_path,
        })
    }
}

/// Process-wide configuration for the query service.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub grpc_port: u16,
    pub namespaces: Vec<String>,
    pub refresh_interval_seconds: u64,
    pub default_query_limit: usize,
    pub default_query_timeout_seconds: u64,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

const DEFAULT_QUERY_GRPC_PORT: u16 = 50053;
const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_QUERY_RESULT_LIMIT: usize = 1_000;
const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 30;

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            grpc_port: DEFAULT_QUERY_GRPC_PORT,
            namespaces: vec!["default".to_string()],
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECONDS,
            default_query_limit: DEFAULT_QUERY_RESULT_LIMIT,
            default_query_timeout_seconds: DEFAULT_QUERY_TIMEOUT_SECONDS,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl QueryConfig {
    /// `QUERY_NAMESPACES` is a comma-separated list; the background refresh
    /// loop discovers tables under each one. Defaults to `["default"]` when
    /// unset so a single-tenant deployment needs no extra configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cert_path = env::var("GRPC_TLS_CERT").ok().filter(|s| !s.is_empty());
        let key_path = env::var("GRPC_TLS_KEY").ok().filter(|s| !s.is_empty());
        if cert_path.is_some() != key_path.is_some() {
            return Err(ConfigError::IncompleteTlsPair);
        }

        let namespaces = env::var("QUERY_NAMESPACES")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect::<Vec<_>>())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec!["default".to_string()]);

        let grpc_port = env::var("QUERY_GRPC_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUERY_GRPC_PORT);
        let refresh_interval_seconds = env::var("QUERY_REFRESH_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECONDS);
        let default_query_limit = env::var("QUERY_DEFAULT_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUERY_RESULT_LIMIT);
        let default_query_timeout_seconds = env::var("QUERY_DEFAULT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECONDS);

        Ok(Self {
            grpc_port,
            namespaces,
            refresh_interval_seconds,
            default_query_limit,
            default_query_timeout_seconds,
            tls_cert_path: cert_path,
            tls_key_path: key_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nessie_host_url_strips_known_suffixes() {
        let cfg = NessieConfig {
            url: "http://nessie:19120/api/v1".to_string(),
        };
        assert_eq!(cfg.api_v2_url(), "http://nessie:19120/api/v2");
        assert_eq!(cfg.base_url(), "http://nessie:19120/iceberg");
    }

    #[test]
    fn nessie_host_url_passthrough_when_no_suffix() {
        let cfg = NessieConfig {
            url: "http://nessie:19120".to_string(),
        };
        assert_eq!(cfg.api_v2_url(), "http://nessie:19120/api/v2");
    }

    #[test]
    fn with_overrides_only_touches_keys_present() {
        let base = S3Config::default();
        let mut overrides = HashMap::new();
        overrides.insert("S3_ACCESS_KEY".to_string(), "run-scoped-key".to_string());
        let cfg = base.with_overrides(&overrides);
        assert_eq!(cfg.access_key, "run-scoped-key");
        assert_eq!(cfg.bucket, base.bucket);
    }

    #[test]
    fn s3_config_endpoint_url_respects_ssl_flag() {
        let cfg = S3Config {
            use_ssl: true,
            endpoint: "s3.example.com".to_string(),
            ..S3Config::default()
        };
        assert_eq!(cfg.endpoint_url(), "https://s3.example.com");
    }

    #[test]
    fn query_config_defaults_to_single_default_namespace() {
        let cfg = QueryConfig::default();
        assert_eq!(cfg.namespaces, vec!["default".to_string()]);
        assert_eq!(cfg.grpc_port, 50053);
    }
}
