use serde::Deserialize;
use std::fmt;
use std::fs;
use std::time::Duration;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Full endpoint; takes precedence over `base_url` + `model`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<Credential>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            model: default_model(),
            url: None,
            api_key: None,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

/// Upstream access token. Never printed through `Debug`.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([redacted])")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub dump_upstream: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub exporters: ExportersConfig,
    #[serde(default)]
    pub otlp_grpc: OtlpGrpcConfig,
    #[serde(default)]
    pub otlp_http: OtlpHttpConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            dump_upstream: false,
            logging: LoggingConfig::default(),
            exporters: ExportersConfig::default(),
            otlp_grpc: OtlpGrpcConfig::default(),
            otlp_http: OtlpHttpConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_stdout")]
    pub stdout: bool,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            stdout: default_log_stdout(),
            file: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExporterKind {
    #[default]
    None,
    OtlpGrpc,
    LangfuseHttp,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExportersConfig {
    #[serde(default)]
    pub tracing: ExporterKind,
    #[serde(default)]
    pub metrics: ExporterKind,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OtlpGrpcConfig {
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otlp_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OtlpGrpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_otlp_endpoint(),
            timeout_ms: default_otlp_timeout_ms(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OtlpHttpConfig {
    #[serde(default = "default_langfuse_http_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_langfuse_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OtlpHttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_langfuse_http_base_url(),
            public_key: String::new(),
            secret_key: String::new(),
            timeout_ms: default_langfuse_timeout_ms(),
        }
    }
}

impl OtlpHttpConfig {
    pub fn traces_endpoint(&self) -> String {
        format!("{}/v1/traces", self.base_url.trim_end_matches('/'))
    }

    pub fn metrics_endpoint(&self) -> String {
        format!("{}/v1/metrics", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CONFIG_PATH read error ({path}): {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CONFIG_PATH invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {key} value: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// Reads the optional YAML file named by `CONFIG_PATH`, then applies
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").ok();
        Self::load(path.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn load(
        path: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_string(),
                    source,
                })?;
                Self::from_yaml(&content)?
            }
            None => Config::default(),
        };
        config.apply_env(env)?;
        config.normalize()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = env("HF_API_KEY") {
            self.upstream.api_key = Some(Credential::new(key));
        }
        if let Some(model) = env("HF_MODEL") {
            self.upstream.model = model;
        }
        if let Some(url) = env("HF_URL") {
            self.upstream.url = Some(url);
        }
        if let Some(raw) = env("UPSTREAM_TIMEOUT_MS") {
            self.upstream.timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "UPSTREAM_TIMEOUT_MS",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = env("PORT") {
            let port: u16 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PORT",
                value: raw.clone(),
            })?;
            self.server.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(level) = env("LOG_LEVEL") {
            self.observability.logging.level = level;
        }
        Ok(())
    }

    /// Endpoint the chat handler posts to.
    pub fn inference_url(&self) -> String {
        match &self.upstream.url {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}",
                self.upstream.base_url.trim_end_matches('/'),
                self.upstream.model.trim_start_matches('/')
            ),
        }
    }

    pub fn credential(&self) -> Option<&str> {
        self.upstream.api_key.as_ref().map(Credential::expose)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.connect_timeout_ms)
    }

    fn normalize(&mut self) -> Result<(), ConfigError> {
        // A blank key behaves like no key; startup only warns about it.
        if self
            .upstream
            .api_key
            .as_ref()
            .is_some_and(|key| key.expose().trim().is_empty())
        {
            self.upstream.api_key = None;
        }
        if self.upstream.url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            self.upstream.url = None;
        }
        if self.upstream.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "upstream.timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.observability.logging.format = self.observability.logging.format.to_lowercase();
        self.observability.logging.level = self.observability.logging.level.to_lowercase();
        match self.observability.logging.format.as_str() {
            "text" | "json" => {}
            other => return Err(ConfigError::Invalid(format!("logging.format invalid: {}", other))),
        }
        match self.observability.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::Invalid(format!("logging.level invalid: {}", other))),
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests(url: &str) -> Self {
        let mut config = Config::default();
        config.upstream.url = Some(url.to_string());
        config.upstream.api_key = Some(Credential::new("hf_test_token"));
        config.upstream.timeout_ms = 2000;
        config.upstream.connect_timeout_ms = 500;
        config
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_upstream_base_url() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}

fn default_model() -> String {
    "google/gemma-2-2b-it".to_string()
}

fn default_timeout_ms() -> u64 {
    60000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_pool_max_idle_per_host() -> usize {
    64
}

fn default_service_name() -> String {
    "chat-proxy".to_string()
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otlp_timeout_ms() -> u64 {
    3000
}

fn default_langfuse_http_base_url() -> String {
    "https://cloud.langfuse.com/api/public/otel".to_string()
}

fn default_langfuse_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_stdout() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_hosted_inference_endpoint() {
        let config = Config::load(None, env_from(&[])).expect("config");
        assert_eq!(
            config.inference_url(),
            "https://api-inference.huggingface.co/models/google/gemma-2-2b-it"
        );
        assert_eq!(config.request_timeout(), Duration::from_millis(60000));
        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
        assert!(config.credential().is_none());
        assert_eq!(config.observability.exporters.tracing, ExporterKind::None);
    }

    #[test]
    fn env_overrides_model_key_and_port() {
        let config = Config::load(
            None,
            env_from(&[
                ("HF_API_KEY", "hf_abc"),
                ("HF_MODEL", "mistralai/Mistral-7B-Instruct-v0.3"),
                ("PORT", "8081"),
                ("UPSTREAM_TIMEOUT_MS", "1500"),
            ]),
        )
        .expect("config");
        assert_eq!(config.credential(), Some("hf_abc"));
        assert!(config.inference_url().ends_with("/mistralai/Mistral-7B-Instruct-v0.3"));
        assert_eq!(config.server.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.upstream.timeout_ms, 1500);
    }

    #[test]
    fn explicit_url_wins_over_model() {
        let config = Config::load(
            None,
            env_from(&[("HF_URL", "http://127.0.0.1:9000/generate"), ("HF_MODEL", "x/y")]),
        )
        .expect("config");
        assert_eq!(config.inference_url(), "http://127.0.0.1:9000/generate");
    }

    #[test]
    fn blank_credential_is_treated_as_missing() {
        let config = Config::load(None, env_from(&[("HF_API_KEY", "   ")])).expect("config");
        assert!(config.credential().is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Config::load(None, env_from(&[("PORT", "http")])).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidEnv { key: "PORT", .. }));
    }

    #[test]
    fn yaml_sections_are_optional_and_validated() {
        let mut config = Config::from_yaml(
            r#"
upstream:
  model: bigscience/bloom
  timeout_ms: 10000
observability:
  logging:
    level: DEBUG
  exporters:
    metrics: langfuse_http
"#,
        )
        .expect("yaml");
        config.normalize().expect("normalize");
        assert_eq!(config.upstream.model, "bigscience/bloom");
        assert_eq!(config.upstream.timeout_ms, 10000);
        assert_eq!(config.observability.logging.level, "debug");
        assert_eq!(config.observability.exporters.metrics, ExporterKind::LangfuseHttp);
        assert_eq!(config.observability.exporters.tracing, ExporterKind::None);

        let mut bad = Config::from_yaml("observability:\n  logging:\n    format: xml\n").expect("yaml");
        assert!(bad.normalize().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::load(None, env_from(&[("UPSTREAM_TIMEOUT_MS", "0")])).expect_err("should fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let config = Config::load(None, env_from(&[("HF_API_KEY", "hf_secret_value")])).expect("config");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hf_secret_value"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = Config::load(Some("/nonexistent/chat-proxy.yaml"), env_from(&[]))
            .expect_err("should fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
