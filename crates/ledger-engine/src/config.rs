//! # Ledger Configuration
//!
//! Configuration management for the ledger engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LEDGER_DB_PATH=/var/lib/ledger/ledger.db                           │
//! │     LEDGER_REFERENCE_PREFIX=ABO                                        │
//! │     LEDGER_MAX_ATTEMPTS=3                                              │
//! │     LEDGER_AUTO_COMPLETE=true                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, or                                                  │
//! │     ~/.config/negotiation-ledger/ledger.toml (Linux)                   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [database]
//! path = "/var/lib/ledger/ledger.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [ledger]
//! reference_prefix = "ABO"
//! reconciliation_epsilon_cents = 1
//! auto_complete = true
//!
//! [concurrency]
//! max_attempts = 3
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//! lock_timeout_ms = 5000
//!
//! [audit]
//! page_size = 100
//! ```

use ledger_core::validation::validate_reference_prefix;
use ledger_core::{Money, DEFAULT_REFERENCE_PREFIX};
use ledger_db::DbConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how the ledger stores its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `ledger.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Ledger Rules
// =============================================================================

/// Tunables of the ledger rules themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// First segment of installment reference codes (`ABO-2026-10-001`).
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,

    /// Tolerance between approved sums and the negotiation total.
    #[serde(default = "default_epsilon")]
    pub reconciliation_epsilon_cents: i64,

    /// Complete an active negotiation when an installment brings it to 100%.
    #[serde(default = "default_true")]
    pub auto_complete: bool,
}

fn default_reference_prefix() -> String {
    DEFAULT_REFERENCE_PREFIX.to_string()
}

fn default_epsilon() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            reference_prefix: default_reference_prefix(),
            reconciliation_epsilon_cents: default_epsilon(),
            auto_complete: true,
        }
    }
}

impl LedgerSettings {
    pub fn epsilon(&self) -> Money {
        Money::from_cents(self.reconciliation_epsilon_cents)
    }
}

// =============================================================================
// Concurrency Settings
// =============================================================================

/// Locking and retry behavior of mutating operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    /// Attempts per mutation before ConcurrencyConflict is surfaced.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// How long a mutation waits for its negotiation's lock.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    20
}
fn default_max_backoff() -> u64 {
    500
}
fn default_lock_timeout() -> u64 {
    5_000
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        ConcurrencySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            lock_timeout_ms: default_lock_timeout(),
        }
    }
}

impl ConcurrencySettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Audit Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Records fetched per page when streaming an entity's history.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    100
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            page_size: default_page_size(),
        }
    }
}

// =============================================================================
// Main Ledger Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub concurrency: ConcurrencySettings,

    #[serde(default)]
    pub audit: AuditSettings,
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LedgerResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> LedgerResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| LedgerError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LedgerResult<()> {
        validate_reference_prefix(&self.ledger.reference_prefix)
            .map_err(|e| LedgerError::Config(e.to_string()))?;

        if self.ledger.reconciliation_epsilon_cents < 0 {
            return Err(LedgerError::Config(
                "reconciliation_epsilon_cents must not be negative".into(),
            ));
        }
        if self.concurrency.max_attempts == 0 {
            return Err(LedgerError::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(LedgerError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.audit.page_size == 0 {
            return Err(LedgerError::Config(
                "page_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides read through `lookup` (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LEDGER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(prefix) = lookup("LEDGER_REFERENCE_PREFIX") {
            debug!(prefix = %prefix, "Overriding reference prefix from environment");
            self.ledger.reference_prefix = prefix;
        }

        if let Some(attempts) = lookup("LEDGER_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.concurrency.max_attempts = n,
                Err(_) => warn!(value = %attempts, "Ignoring invalid LEDGER_MAX_ATTEMPTS"),
            }
        }

        if let Some(flag) = lookup("LEDGER_AUTO_COMPLETE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.ledger.auto_complete = true,
                "0" | "false" | "no" | "off" => self.ledger.auto_complete = false,
                _ => warn!(value = %flag, "Ignoring invalid LEDGER_AUTO_COMPLETE"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "negotiation-ledger", "ledger")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The SQLite file to open.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("ledger.db")))
            .unwrap_or_else(|| PathBuf::from("ledger.db"))
    }

    /// Storage configuration derived from the `[database]` section.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}
