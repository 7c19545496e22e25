//! Application configuration management.

use serde::Deserialize;

use crate::context::TenantKey;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Pagination bounds for list queries.
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Tenant partitioning.
    #[serde(default)]
    pub tenancy: TenancyConfig,
}

/// Cache configuration for the balance overlay and the transaction route cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of balance overlay entries per tenant.
    #[serde(default = "default_balance_capacity")]
    pub balance_capacity: u64,
    /// Time-to-live of a balance overlay entry in seconds.
    #[serde(default = "default_balance_ttl")]
    pub balance_ttl_secs: u64,
    /// Maximum number of cached transaction routes per tenant.
    #[serde(default = "default_route_capacity")]
    pub route_capacity: u64,
    /// Time-to-live of a cached transaction route in seconds.
    #[serde(default = "default_route_ttl")]
    pub route_ttl_secs: u64,
    /// Maximum number of tenant partitions kept alive at once.
    #[serde(default = "default_max_tenants")]
    pub max_tenants: u64,
}

fn default_balance_capacity() -> u64 {
    100_000
}

fn default_balance_ttl() -> u64 {
    3600 // 1 hour
}

fn default_route_capacity() -> u64 {
    10_000
}

fn default_route_ttl() -> u64 {
    86_400 // 1 day
}

fn default_max_tenants() -> u64 {
    1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            balance_capacity: default_balance_capacity(),
            balance_ttl_secs: default_balance_ttl(),
            route_capacity: default_route_capacity(),
            route_ttl_secs: default_route_ttl(),
            max_tenants: default_max_tenants(),
        }
    }
}

/// Pagination bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationConfig {
    /// Limit applied when the request does not carry one.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Largest accepted limit; larger values are rejected, not clamped.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

fn default_limit() -> u32 {
    10
}

fn default_max_limit() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Filter directives used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "ledgerline=info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Tenant partitioning configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Whether requests carry their own tenant key.
    #[serde(default)]
    pub multi_tenant: bool,
    /// Tenant used for single-tenant deployments and requests without a key.
    #[serde(default = "default_tenant")]
    pub default_tenant: String,
}

fn default_tenant() -> String {
    TenantKey::DEFAULT.to_string()
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            multi_tenant: false,
            default_tenant: default_tenant(),
        }
    }
}

impl TenancyConfig {
    /// Resolves the tenant a request addresses.
    ///
    /// Single-tenant deployments ignore the requested key. Multi-tenant deployments use it
    /// when present and non-blank, falling back to the default tenant otherwise.
    #[must_use]
    pub fn resolve(&self, requested: Option<&str>) -> TenantKey {
        match requested.map(str::trim) {
            Some(key) if self.multi_tenant && !key.is_empty() => TenantKey::new(key),
            _ => TenantKey::new(self.default_tenant.clone()),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, lowest precedence first: `config/default`, `config/{RUN_MODE}`, then
    /// `LEDGERLINE__SECTION__FIELD` environment variables. A `.env` file is read first.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("LEDGERLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
