use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub tenancy: TenancyConfig,
    pub adapter: AdapterRetryConfig,
    pub reconciliation: ReconciliationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TenancyConfig {
    /// Host suffix under which `<subdomain>.<base_domain>` resolves a tenant.
    /// Without it only the tenant header is honoured.
    pub base_domain: Option<String>,
    pub tenant_header: String,
    pub catalog_cache_ttl_secs: u64,
    /// Per-principal request budget; zero disables throttling.
    pub requests_per_minute: u32,
    /// TOML manifest of tenants, principals and products loaded at startup.
    pub manifest_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AdapterRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
    pub call_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Delivery windows end on a multiple of this, so reruns inside the same
    /// slot ask the ad server for the same window.
    pub window_granularity_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub port: Option<u16>,
    pub base_domain: Option<String>,
    pub reconciliation_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://salesagent.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            tenancy: TenancyConfig {
                base_domain: None,
                tenant_header: "x-adcp-tenant".to_string(),
                catalog_cache_ttl_secs: 60,
                requests_per_minute: 600,
                manifest_path: None,
            },
            adapter: AdapterRetryConfig {
                max_attempts: 3,
                base_delay_ms: 200,
                backoff_multiplier: 2,
                call_timeout_secs: 30,
            },
            reconciliation: ReconciliationConfig {
                enabled: true,
                interval_secs: 300,
                window_granularity_secs: 3600,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("salesagent.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(tenancy) = patch.tenancy {
            if let Some(base_domain) = tenancy.base_domain {
                self.tenancy.base_domain = Some(base_domain);
            }
            if let Some(tenant_header) = tenancy.tenant_header {
                self.tenancy.tenant_header = tenant_header;
            }
            if let Some(ttl) = tenancy.catalog_cache_ttl_secs {
                self.tenancy.catalog_cache_ttl_secs = ttl;
            }
            if let Some(requests_per_minute) = tenancy.requests_per_minute {
                self.tenancy.requests_per_minute = requests_per_minute;
            }
            if let Some(manifest_path) = tenancy.manifest_path {
                self.tenancy.manifest_path = Some(manifest_path);
            }
        }

        if let Some(adapter) = patch.adapter {
            if let Some(max_attempts) = adapter.max_attempts {
                self.adapter.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = adapter.base_delay_ms {
                self.adapter.base_delay_ms = base_delay_ms;
            }
            if let Some(multiplier) = adapter.backoff_multiplier {
                self.adapter.backoff_multiplier = multiplier;
            }
            if let Some(call_timeout_secs) = adapter.call_timeout_secs {
                self.adapter.call_timeout_secs = call_timeout_secs;
            }
        }

        if let Some(reconciliation) = patch.reconciliation {
            if let Some(enabled) = reconciliation.enabled {
                self.reconciliation.enabled = enabled;
            }
            if let Some(interval_secs) = reconciliation.interval_secs {
                self.reconciliation.interval_secs = interval_secs;
            }
            if let Some(granularity) = reconciliation.window_granularity_secs {
                self.reconciliation.window_granularity_secs = granularity;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SALESAGENT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SALESAGENT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SALESAGENT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SALESAGENT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SALESAGENT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SALESAGENT_SERVER_PORT") {
            self.server.port = parse_u16("SALESAGENT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SALESAGENT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SALESAGENT_TENANCY_BASE_DOMAIN") {
            self.tenancy.base_domain = Some(value);
        }
        if let Some(value) = read_env("SALESAGENT_TENANCY_TENANT_HEADER") {
            self.tenancy.tenant_header = value;
        }
        if let Some(value) = read_env("SALESAGENT_TENANCY_CATALOG_CACHE_TTL_SECS") {
            self.tenancy.catalog_cache_ttl_secs =
                parse_u64("SALESAGENT_TENANCY_CATALOG_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_TENANCY_REQUESTS_PER_MINUTE") {
            self.tenancy.requests_per_minute =
                parse_u32("SALESAGENT_TENANCY_REQUESTS_PER_MINUTE", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_TENANCY_MANIFEST_PATH") {
            self.tenancy.manifest_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("SALESAGENT_ADAPTER_MAX_ATTEMPTS") {
            self.adapter.max_attempts = parse_u32("SALESAGENT_ADAPTER_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_ADAPTER_BASE_DELAY_MS") {
            self.adapter.base_delay_ms = parse_u64("SALESAGENT_ADAPTER_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_ADAPTER_CALL_TIMEOUT_SECS") {
            self.adapter.call_timeout_secs =
                parse_u64("SALESAGENT_ADAPTER_CALL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SALESAGENT_RECONCILIATION_ENABLED") {
            self.reconciliation.enabled = parse_bool("SALESAGENT_RECONCILIATION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SALESAGENT_RECONCILIATION_INTERVAL_SECS") {
            self.reconciliation.interval_secs =
                parse_u64("SALESAGENT_RECONCILIATION_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("SALESAGENT_LOGGING_LEVEL").or_else(|| read_env("SALESAGENT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SALESAGENT_LOGGING_FORMAT").or_else(|| read_env("SALESAGENT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(base_domain) = overrides.base_domain {
            self.tenancy.base_domain = Some(base_domain);
        }
        if let Some(enabled) = overrides.reconciliation_enabled {
            self.reconciliation.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_tenancy(&self.tenancy)?;
        validate_adapter(&self.adapter)?;
        validate_reconciliation(&self.reconciliation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("salesagent.toml"), PathBuf::from("config/salesagent.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_tenancy(tenancy: &TenancyConfig) -> Result<(), ConfigError> {
    if let Some(base_domain) = &tenancy.base_domain {
        let trimmed = base_domain.trim();
        if trimmed.is_empty() || trimmed.starts_with('.') || trimmed.contains(':') {
            return Err(ConfigError::Validation(
                "tenancy.base_domain must be a bare host name such as `agent.example.com`"
                    .to_string(),
            ));
        }
    }

    let header = tenancy.tenant_header.trim();
    let valid_header = !header.is_empty()
        && header.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid_header {
        return Err(ConfigError::Validation(
            "tenancy.tenant_header must be a non-empty HTTP header name".to_string(),
        ));
    }

    Ok(())
}

fn validate_adapter(adapter: &AdapterRetryConfig) -> Result<(), ConfigError> {
    if adapter.max_attempts == 0 || adapter.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "adapter.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if adapter.backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "adapter.backoff_multiplier must be greater than zero".to_string(),
        ));
    }

    if adapter.call_timeout_secs == 0 || adapter.call_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "adapter.call_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_reconciliation(reconciliation: &ReconciliationConfig) -> Result<(), ConfigError> {
    if reconciliation.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "reconciliation.interval_secs must be greater than zero".to_string(),
        ));
    }

    if reconciliation.window_granularity_secs == 0 {
        return Err(ConfigError::Validation(
            "reconciliation.window_granularity_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    tenancy: Option<TenancyPatch>,
    adapter: Option<AdapterPatch>,
    reconciliation: Option<ReconciliationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TenancyPatch {
    base_domain: Option<String>,
    tenant_header: Option<String>,
    catalog_cache_ttl_secs: Option<u64>,
    requests_per_minute: Option<u32>,
    manifest_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AdapterPatch {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<u32>,
    call_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconciliationPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    window_granularity_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| err.to_string())?;
        ensure(config.tenancy.tenant_header == "x-adcp-tenant", "default tenant header")?;
        ensure(config.tenancy.base_domain.is_none(), "no base domain by default")?;
        ensure(config.adapter.max_attempts == 3, "three adapter attempts by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SALESAGENT_BASE_DOMAIN", "agent.example.com");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("salesagent.toml");
            fs::write(
                &path,
                r#"
[tenancy]
base_domain = "${TEST_SALESAGENT_BASE_DOMAIN}"
requests_per_minute = 30

[reconciliation]
interval_secs = 60
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.tenancy.base_domain.as_deref() == Some("agent.example.com"),
                "base domain should be interpolated from environment",
            )?;
            ensure(config.tenancy.requests_per_minute == 30, "rate limit should come from file")?;
            ensure(config.reconciliation.interval_secs == 60, "interval should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_SALESAGENT_BASE_DOMAIN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SALESAGENT_LOG_LEVEL", "warn");
        env::set_var("SALESAGENT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SALESAGENT_LOG_LEVEL", "SALESAGENT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SALESAGENT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SALESAGENT_SERVER_PORT", "9090");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("salesagent.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file and defaults")?;
            Ok(())
        })();

        clear_vars(&["SALESAGENT_DATABASE_URL", "SALESAGENT_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SALESAGENT_ADAPTER_MAX_ATTEMPTS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("adapter.max_attempts")
            );
            ensure(has_message, "validation failure should mention adapter.max_attempts")
        })();

        clear_vars(&["SALESAGENT_ADAPTER_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn invalid_env_number_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SALESAGENT_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                    ensure(key == "SALESAGENT_SERVER_PORT", "error should name the variable")
                }
                Err(other) => Err(format!("unexpected error: {other}")),
                Ok(_) => Err("expected invalid override".to_string()),
            }
        })();

        clear_vars(&["SALESAGENT_SERVER_PORT"]);
        result
    }

    #[test]
    fn base_domain_with_port_is_rejected() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.tenancy.base_domain = Some("agent.example.com:8080".to_string());
        let rejected = matches!(
            config.validate(),
            Err(ConfigError::Validation(ref message)) if message.contains("tenancy.base_domain")
        );
        ensure(rejected, "base domain with a port should fail validation")
    }
}
