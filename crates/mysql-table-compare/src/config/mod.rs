//! Configuration loading and connection setup.

pub mod types;
pub mod validation;

pub use types::{CompareConfig, CompareOptions, SideConfig, DEFAULT_KEY, DEFAULT_KEYLEN};
pub use validation::{ConnectionParams, ResolvedOptions, ResolvedSide};

use std::path::Path;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::info;

use crate::error::{CompareError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

impl CompareConfig {
    /// Load configuration from a file.
    ///
    /// Automatically detects the format based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Other extensions default to YAML
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CompareConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CompareConfig = serde_json::from_str(json)
            .map_err(|e| CompareError::config(format!("failed to parse JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration without connecting anywhere.
    pub fn validate(&self) -> Result<()> {
        validation::resolve_connections(&self.left, &self.right)?;
        validation::resolve_sides(
            &validation::SideFields::from(&self.left),
            &validation::SideFields::from(&self.right),
        )?;
        self.options.resolve()?;
        Ok(())
    }
}

impl ConnectionParams {
    /// Open a small connection pool for this side.
    pub async fn connect(&self) -> Result<MySqlPool> {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                CompareError::query(e, format!("connecting to {}:{}", self.host, self.port))
            })?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                CompareError::query(e, format!("testing connection to {}:{}", self.host, self.port))
            })?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            self.host, self.port, self.database
        );

        Ok(pool)
    }
}
