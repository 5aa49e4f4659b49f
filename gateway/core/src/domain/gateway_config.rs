// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for the CRM API gateway, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP server settings
// - Aggregator policy (concurrency, caching, retries, graph validation)
// - Backend service endpoints
// - Health probing and observability settings

use crate::domain::endpoint::ServiceEndpoint;
use crate::domain::graph::GraphPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "crm.gateway/v1";
pub const KIND: &str = "GatewayConfig";

/// Backend services the gateway fronts by default, with the environment
/// variable that overrides each base URL.
const DEFAULT_SERVICES: &[(&str, &str, &str)] = &[
    ("iam", "IAM_SERVICE_URL", "http://localhost:8081"),
    ("customer", "CUSTOMER_SERVICE_URL", "http://localhost:8082"),
    ("sales", "SALES_SERVICE_URL", "http://localhost:8083"),
    ("notification", "NOTIFICATION_SERVICE_URL", "http://localhost:8084"),
];

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "crm.gateway/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub health: HealthConfig,

    /// Backend services registered at startup
    #[serde(default)]
    pub services: Vec<ServiceEndpoint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long in-flight requests may run after a shutdown signal
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Aggregation policy shared by every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Per-attempt transport timeout when the endpoint does not set one
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Whole-batch deadline; once reached no new calls start and in-flight
    /// calls are cancelled
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub batch_timeout: Option<Duration>,

    /// Upper bound of concurrently executing calls across one batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_true")]
    pub enable_caching: bool,

    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Extra attempts after a transport failure (total attempts = retries + 1)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base delay; attempt `n` waits `retry_delay * (n + 1)`
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    #[serde(default = "default_true")]
    pub reject_cycles: bool,

    #[serde(default)]
    pub reject_dangling_dependencies: bool,
}

impl AggregatorConfig {
    pub fn graph_policy(&self) -> GraphPolicy {
        GraphPolicy {
            reject_cycles: self.reject_cycles,
            reject_dangling: self.reject_dangling_dependencies,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            batch_timeout: None,
            max_concurrent: default_max_concurrent(),
            enable_caching: true,
            cache_ttl: default_cache_ttl(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            reject_cycles: true,
            reject_dangling_dependencies: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Interval of the background sweep that evicts expired entries
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_health_interval(),
            timeout: default_health_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent() -> usize {
    10
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_services() -> Vec<ServiceEndpoint> {
    DEFAULT_SERVICES
        .iter()
        .map(|(name, _, url)| ServiceEndpoint::new(*name, *url).with_health_path("/health"))
        .collect()
}

impl Default for GatewayConfigSpec {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            aggregator: AggregatorConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
            services: default_services(),
            observability: None,
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "api-gateway".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. CRM_GATEWAY_CONFIG_PATH environment variable
    /// 2. ./crm-gateway.yaml (working directory)
    /// 3. ~/.crm-gateway/config.yaml (user home)
    /// 4. /etc/crm-gateway/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CRM_GATEWAY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./crm-gateway.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".crm-gateway").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/crm-gateway/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("CRM_GATEWAY_MAX_CONCURRENT") {
            match val.parse::<usize>() {
                Ok(max) => {
                    tracing::info!("Environment override: CRM_GATEWAY_MAX_CONCURRENT={}", max);
                    self.spec.aggregator.max_concurrent = max;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CRM_GATEWAY_MAX_CONCURRENT: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("CRM_GATEWAY_ENABLE_CACHING") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: CRM_GATEWAY_ENABLE_CACHING=true");
                    self.spec.aggregator.enable_caching = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: CRM_GATEWAY_ENABLE_CACHING=false");
                    self.spec.aggregator.enable_caching = false;
                }
                _ => tracing::warn!(
                    "Invalid value for CRM_GATEWAY_ENABLE_CACHING: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }

        for &(name, variable, _) in DEFAULT_SERVICES {
            let Some(url) = lookup(variable) else {
                continue;
            };
            tracing::info!("Environment override: {}={}", variable, url);
            match self.spec.services.iter_mut().find(|service| service.name == name) {
                Some(service) => service.base_url = url,
                None => self
                    .spec
                    .services
                    .push(ServiceEndpoint::new(name, url).with_health_path("/health")),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.aggregator.max_concurrent == 0 {
            anyhow::bail!("spec.aggregator.max_concurrent must be at least 1");
        }

        if self.spec.cache.sweep_interval.is_zero() {
            anyhow::bail!("spec.cache.sweep_interval must be greater than zero");
        }

        if self.spec.health.enabled && self.spec.health.interval.is_zero() {
            anyhow::bail!("spec.health.interval must be greater than zero when health checks are enabled");
        }

        let mut seen = HashSet::new();
        for service in &self.spec.services {
            if service.name.is_empty() {
                anyhow::bail!("Service name cannot be empty");
            }

            if !seen.insert(service.name.as_str()) {
                anyhow::bail!("Duplicate service name: {}", service.name);
            }

            let url = url::Url::parse(&service.base_url).map_err(|e| {
                anyhow::anyhow!("Invalid base_url for service '{}': {}", service.name, e)
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                anyhow::bail!(
                    "Service '{}' base_url must use http or https, got '{}'",
                    service.name,
                    url.scheme()
                );
            }
        }

        Ok(())
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|observability| observability.logging.clone())
            .unwrap_or_else(|| LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            })
    }
}
