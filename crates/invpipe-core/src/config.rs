//! Configuration system for the inventory pipeline, built on config-rs.
//!
//! Layers compiled-in defaults, an optional TOML file, then environment
//! variable overrides into one `AppConfig` assembled once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration handed to every worker as an `Arc<AppConfig>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub queues: QueueNamesConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub cleanup: CleanupConfig,
    pub breaker: BreakerConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
    pub modules: ModulesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            queues: QueueNamesConfig::default(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            cleanup: CleanupConfig::default(),
            breaker: BreakerConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
            modules: ModulesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then an optional TOML file, then environment overrides.
    ///
    /// Environment variables use the names listed in the spec (`BATCH_SIZE`,
    /// `DATABASE_URL`, ...) rather than a nested `APP__SECTION__FIELD` scheme,
    /// so overrides are applied by hand after the file layer rather than via
    /// `config::Environment`'s automatic nesting.
    pub fn load(file_path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut cfg = if let Some(path) = file_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| config::ConfigError::Message(e.to_string()))?;
                toml::from_str(&text).map_err(|e| config::ConfigError::Message(e.to_string()))?
            } else {
                Self::default()
            }
        } else {
            Self::default()
        };

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        use std::env;

        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNS") {
            if let Ok(n) = v.parse() {
                self.database.pool_max = n;
            }
        }
        if let Ok(v) = env::var("REDIS_URL") {
            self.redis.url = v;
        }
        if let Ok(v) = env::var("BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                self.batch.batch_size = n;
            }
        }
        if let Ok(v) = env::var("FLUSH_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.batch.flush_interval_secs = n;
            }
        }
        if let Ok(v) = env::var("QUEUE_POLL_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.batch.queue_poll_timeout_secs = n;
            }
        }
        if let Ok(v) = env::var("RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.retry.max_attempts = n;
            }
        }
        if let Ok(v) = env::var("INVENTORY_MAX_AGE") {
            if let Ok(n) = v.parse() {
                self.cleanup.max_age_hours = n;
            }
        }
        if let Ok(v) = env::var("CLEANUP_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.cleanup.interval_secs = n;
            }
        }
        if let Ok(v) = env::var("RETENTION_FLOOR") {
            if let Ok(n) = v.parse() {
                self.cleanup.retention_floor = n;
            }
        }
        if let Ok(v) = env::var("HEARTBEAT_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.health.heartbeat_interval_secs = n;
            }
        }
        if let Ok(v) = env::var("HEALTH_CHECK_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.health.check_interval_secs = n;
            }
        }
        if let Ok(v) = env::var("CIRCUIT_MAX_FAILURES") {
            if let Ok(n) = v.parse() {
                self.breaker.max_failures = n;
            }
        }
        if let Ok(v) = env::var("CIRCUIT_RESET_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.breaker.reset_timeout_secs = n;
            }
        }
        if let Ok(v) = env::var("DROP_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.breaker.drop_threshold = n;
            }
        }
        if let Ok(v) = env::var("QUEUE_INVENTORY_NAME") {
            self.queues.inventory = v;
        }
        if let Ok(v) = env::var("QUEUE_PROCESSING_NAME") {
            self.queues.processing = v;
        }
        if let Ok(v) = env::var("QUEUE_NOTIFICATION_NAME") {
            self.queues.notification = v;
        }
        if let Ok(v) = env::var("MODULES_CONFIG_PATH") {
            self.modules.config_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("RUST_LOG") {
            self.logging.level = v;
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/inventory_pipeline".to_string(),
            pool_min: 2,
            pool_max: 40,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

/// Redis connection configuration (queue transport).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_max_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_max_size: 16,
        }
    }
}

/// The three durable queue names (§4.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueNamesConfig {
    pub inventory: String,
    pub processing: String,
    pub notification: String,
    pub key_prefix: String,
}

impl Default for QueueNamesConfig {
    fn default() -> Self {
        Self {
            inventory: "inventory".to_string(),
            processing: "processing".to_string(),
            notification: "notification".to_string(),
            key_prefix: "invpipe".to_string(),
        }
    }
}

/// Batching and timing parameters shared by the consumer and inventory worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    pub queue_poll_timeout_secs: u64,
    pub channel_send_timeout_secs: u64,
    pub insert_transaction_timeout_secs: u64,
    pub diff_transaction_timeout_secs: u64,
    pub status_update_timeout_secs: u64,
    pub diff_sub_batch_size: usize,
    pub notification_sub_batch_size: usize,
    pub large_payload_bytes: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_secs: 5,
            queue_poll_timeout_secs: 10,
            channel_send_timeout_secs: 1,
            insert_transaction_timeout_secs: 30,
            diff_transaction_timeout_secs: 10,
            status_update_timeout_secs: 5,
            diff_sub_batch_size: 100,
            notification_sub_batch_size: 50,
            large_payload_bytes: 1024 * 1024,
        }
    }
}

impl BatchConfig {
    pub fn channel_capacity(&self) -> usize {
        2 * self.batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn queue_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_poll_timeout_secs)
    }

    pub fn channel_send_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_send_timeout_secs)
    }
}

/// Retry ceiling and backoff bounds, centralised here so no individual
/// worker computes its own backoff schedule (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub failed_queue_warning_ceiling: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_secs: 1,
            backoff_cap_secs: 600,
            failed_queue_warning_ceiling: 50,
        }
    }
}

/// Cleanup worker parameters (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    pub max_age_hours: u64,
    pub retention_floor: u32,
    pub resolved_alert_retention_days: u32,
    pub initial_delay_min_secs: u64,
    pub initial_delay_max_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            max_age_hours: 168,
            retention_floor: 5,
            resolved_alert_retention_days: 30,
            initial_delay_min_secs: 30,
            initial_delay_max_secs: 300,
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Circuit breaker and backpressure parameters (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub max_failures: u32,
    pub reset_timeout_secs: u64,
    pub drop_threshold: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_secs: 30,
            drop_threshold: 0.8,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Health monitor tick intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub heartbeat_interval_secs: u64,
    pub check_interval_secs: u64,
    pub check_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15,
            check_interval_secs: 30,
            check_timeout_secs: 5,
        }
    }
}

impl HealthConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "invpipe=info,tower_http=info,sqlx=warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// The `USER_FACING_MODULES` table and `MODULE_URL_TEMPLATE` map (§6),
/// loaded from a packaged file rather than hand-coded into the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    pub config_path: Option<PathBuf>,
    pub user_facing: HashMap<String, bool>,
    pub url_templates: HashMap<String, String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        let mut user_facing = HashMap::new();
        user_facing.insert("webtop".to_string(), true);
        user_facing.insert("mail".to_string(), true);
        user_facing.insert("nextcloud".to_string(), true);
        user_facing.insert("dokuwiki".to_string(), true);
        user_facing.insert("samba".to_string(), false);
        user_facing.insert("dns".to_string(), false);
        user_facing.insert("firewall".to_string(), false);
        user_facing.insert("traefik".to_string(), false);

        let mut url_templates = HashMap::new();
        url_templates.insert("webtop".to_string(), "https://{fqdn}/webtop".to_string());
        url_templates.insert("mail".to_string(), "https://{fqdn}/mail".to_string());
        url_templates.insert(
            "nextcloud".to_string(),
            "https://{fqdn}/nextcloud".to_string(),
        );
        url_templates.insert(
            "dokuwiki".to_string(),
            "https://{fqdn}/dokuwiki".to_string(),
        );

        Self {
            config_path: None,
            user_facing,
            url_templates,
        }
    }
}

impl ModulesConfig {
    /// Load the packaged `config/modules.toml`, falling back to the built-in
    /// defaults above when no file is configured or present.
    pub fn load(&mut self) -> std::io::Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(path)?;
        let parsed: ModulesFile = toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.user_facing = parsed.user_facing;
        self.url_templates = parsed.url_templates;
        Ok(())
    }

    pub fn is_user_facing(&self, instance_of: &str) -> bool {
        self.user_facing.get(instance_of).copied().unwrap_or(false)
    }

    pub fn url_for(&self, instance_of: &str, fqdn: &str) -> Option<String> {
        self.url_templates
            .get(instance_of)
            .map(|tpl| tpl.replace("{fqdn}", fqdn))
    }
}

#[derive(Debug, Deserialize)]
struct ModulesFile {
    #[serde(default)]
    user_facing: HashMap<String, bool>,
    #[serde(default)]
    url_templates: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.cleanup.retention_floor, 5);
        assert_eq!(config.breaker.max_failures, 5);
    }

    #[test]
    fn test_channel_capacity() {
        let batch = BatchConfig::default();
        assert_eq!(batch.channel_capacity(), 200);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("BATCH_SIZE", "250");
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.batch.batch_size, 250);
        std::env::remove_var("BATCH_SIZE");
    }

    #[test]
    fn test_module_url_template() {
        let modules = ModulesConfig::default();
        assert!(modules.is_user_facing("mail"));
        assert!(!modules.is_user_facing("dns"));
        assert_eq!(
            modules.url_for("mail", "a.example.com"),
            Some("https://a.example.com/mail".to_string())
        );
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.batch.batch_size, deserialized.batch.batch_size);
    }
}
