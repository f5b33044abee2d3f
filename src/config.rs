use crate::error::CatalogError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// S3 object storage configuration
    pub s3: S3Config,
    /// Image ingestion configuration
    pub image: ImageConfig,
    /// API configuration
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// S3 object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for product images
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Signed URL validity window in seconds (24h default for catalog reads)
    #[serde(default = "default_signed_url_expiry_secs")]
    pub signed_url_expiry_secs: u64,
}

/// Image ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Maximum output dimension in pixels; larger images are downscaled
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// JPEG quality for opaque thumbnails (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "catalog-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_signed_url_expiry_secs() -> u64 {
    86400 // 24 hours
}

fn default_max_dimension() -> u32 {
    400
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "catalog-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/catalog").required(false))
            .add_source(config::File::with_name("/etc/catalog/catalog").required(false))
            // Override with environment variables
            // CATALOG__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Reject unserviceable configuration before anything connects.
    /// Missing credentials or bucket names are fatal at startup, never a
    /// per-request error.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.s3.bucket.trim().is_empty() {
            return Err(CatalogError::Configuration(
                "s3.bucket must not be empty".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(CatalogError::Configuration(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.image.max_dimension == 0 {
            return Err(CatalogError::Configuration(
                "image.max_dimension must be positive".to_string(),
            ));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(CatalogError::Configuration(
                "image.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Get database connection timeout as Duration
    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    /// Get database idle timeout as Duration
    pub fn db_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.database.idle_timeout_secs)
    }

    /// Get signed URL expiry as Duration
    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.signed_url_expiry_secs)
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            service: ServiceConfig {
                name: default_service_name(),
                log_level: default_log_level(),
                metrics_port: default_metrics_port(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/catalog".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout_secs(),
                idle_timeout_secs: default_idle_timeout_secs(),
                run_migrations: true,
            },
            s3: S3Config {
                bucket: "catalog-images".to_string(),
                region: default_region(),
                endpoint_url: None,
                force_path_style: false,
                signed_url_expiry_secs: default_signed_url_expiry_secs(),
            },
            image: ImageConfig::default(),
            api: ApiConfig {
                host: default_api_host(),
                port: default_api_port(),
                cors_enabled: true,
                cors_origins: vec![],
                max_upload_bytes: default_max_upload_bytes(),
            },
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_signed_url_expiry_secs(), 86400);
        assert_eq!(default_max_dimension(), 400);
        assert_eq!(default_jpeg_quality(), 80);
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let mut config = test_config();
        config.s3.bucket = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(CatalogError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_jpeg_quality() {
        let mut config = test_config();
        config.image.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signed_url_expiry_duration() {
        let config = test_config();
        assert_eq!(config.signed_url_expiry(), Duration::from_secs(86400));
    }
}
