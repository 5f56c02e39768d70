//! Application configuration loaded from the environment.

use std::env;

const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const MAX_VIDEO_SIZE_MB: usize = 500;
const BCRYPT_COST: u32 = 12;
const DB_MAX_CONNECTIONS: u32 = 20;
const DB_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_PER_MINUTE: u32 = 100;
const AUTH_RATE_LIMIT_ATTEMPTS: u32 = 5;
const AUTH_RATE_LIMIT_WINDOW_SECS: u64 = 900;
const UPLOADS_PER_HOUR: u32 = 20;
const WORKER_CONCURRENCY: usize = 3;
const PROCESSING_TIMEOUT_SECS: i32 = 300;
const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const QUEUE_MAX_ATTEMPTS: i32 = 3;
const QUEUE_BACKOFF_BASE_SECS: u64 = 5;
const STALLED_REAP_INTERVAL_SECS: u64 = 60;
const STALLED_GRACE_PERIOD_SECS: i64 = 60;
const RETAIN_COMPLETED_JOBS: i64 = 100;
const RETAIN_FAILED_JOBS: i64 = 200;

/// Blob storage backend selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: String,
    pub frontend_origin: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub bcrypt_cost: u32,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_video_size_bytes: usize,
    pub allowed_formats: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub database_url: Option<String>,
    pub worker_concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    pub processing_timeout_seconds: i32,
    pub stalled_reap_interval_secs: u64,
    pub stalled_grace_period_secs: i64,
    pub retain_completed: i64,
    pub retain_failed: i64,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub auth_attempts: u32,
    pub auth_window_secs: u64,
    pub uploads_per_hour: u32,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database_url: String,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            _ => StorageBackend::Local,
        };

        let config = Config {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "4000".to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
                environment,
                frontend_origin: env::var("FRONTEND_ORIGIN")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                db_max_connections: env_parse("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS),
                db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", DB_TIMEOUT_SECS),
            },
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            auth: AuthConfig {
                access_token_secret: env::var("ACCESS_TOKEN_SECRET")
                    .map_err(|_| anyhow::anyhow!("ACCESS_TOKEN_SECRET must be set"))?,
                refresh_token_secret: env::var("REFRESH_TOKEN_SECRET")
                    .map_err(|_| anyhow::anyhow!("REFRESH_TOKEN_SECRET must be set"))?,
                access_token_ttl_minutes: env_parse(
                    "ACCESS_TOKEN_TTL_MINUTES",
                    ACCESS_TOKEN_TTL_MINUTES,
                ),
                refresh_token_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS", REFRESH_TOKEN_TTL_DAYS),
                bcrypt_cost: env_parse("BCRYPT_COST", BCRYPT_COST),
            },
            storage: StorageConfig {
                backend,
                local_path: env::var("LOCAL_STORAGE_PATH").ok(),
                s3_bucket: env::var("S3_BUCKET").ok(),
                s3_region: env::var("S3_REGION").ok(),
                s3_endpoint: env::var("S3_ENDPOINT").ok(),
            },
            media: MediaConfig {
                ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
                ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
                max_video_size_bytes: env_parse("MAX_VIDEO_SIZE_MB", MAX_VIDEO_SIZE_MB)
                    * 1024
                    * 1024,
                allowed_formats: env_list("ALLOWED_VIDEO_FORMATS", "mp4,avi,mov,mkv,webm"),
            },
            queue: QueueConfig {
                database_url: env::var("QUEUE_DATABASE_URL").ok(),
                worker_concurrency: env_parse("WORKER_CONCURRENCY", WORKER_CONCURRENCY),
                poll_interval_ms: env_parse("QUEUE_POLL_INTERVAL_MS", QUEUE_POLL_INTERVAL_MS),
                max_attempts: env_parse("QUEUE_MAX_ATTEMPTS", QUEUE_MAX_ATTEMPTS),
                backoff_base_secs: env_parse("QUEUE_BACKOFF_BASE_SECS", QUEUE_BACKOFF_BASE_SECS),
                processing_timeout_seconds: env_parse(
                    "PROCESSING_TIMEOUT_SECS",
                    PROCESSING_TIMEOUT_SECS,
                ),
                stalled_reap_interval_secs: env_parse(
                    "STALLED_REAP_INTERVAL_SECS",
                    STALLED_REAP_INTERVAL_SECS,
                ),
                stalled_grace_period_secs: env_parse(
                    "STALLED_GRACE_PERIOD_SECS",
                    STALLED_GRACE_PERIOD_SECS,
                ),
                retain_completed: env_parse("RETAIN_COMPLETED_JOBS", RETAIN_COMPLETED_JOBS),
                retain_failed: env_parse("RETAIN_FAILED_JOBS", RETAIN_FAILED_JOBS),
            },
            rate_limit: RateLimitConfig {
                per_minute: env_parse("RATE_LIMIT_PER_MINUTE", RATE_LIMIT_PER_MINUTE),
                auth_attempts: env_parse("AUTH_RATE_LIMIT_ATTEMPTS", AUTH_RATE_LIMIT_ATTEMPTS),
                auth_window_secs: env_parse(
                    "AUTH_RATE_LIMIT_WINDOW_SECS",
                    AUTH_RATE_LIMIT_WINDOW_SECS,
                ),
                uploads_per_hour: env_parse("UPLOADS_PER_HOUR", UPLOADS_PER_HOUR),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.server.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// URL for the queue's database connection. Falls back to the main
    /// database when no dedicated queue URL is configured.
    pub fn queue_database_url(&self) -> &str {
        self.queue
            .database_url
            .as_deref()
            .unwrap_or(&self.database_url)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.auth.access_token_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "ACCESS_TOKEN_SECRET must be at least 32 characters long"
            ));
        }
        if self.auth.refresh_token_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "REFRESH_TOKEN_SECRET must be at least 32 characters long"
            ));
        }
        if self.auth.access_token_secret == self.auth.refresh_token_secret {
            return Err(anyhow::anyhow!(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ"
            ));
        }

        if !self.database_url.starts_with("postgres") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a PostgreSQL connection string"
            ));
        }

        if self.is_production() && self.server.frontend_origin.trim() == "*" {
            return Err(anyhow::anyhow!(
                "FRONTEND_ORIGIN cannot be '*' in production"
            ));
        }

        match self.storage.backend {
            StorageBackend::Local => {
                if self.storage.local_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using the local storage backend"
                    ));
                }
            }
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using the S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION must be set when using the S3 storage backend"
                    ));
                }
            }
        }

        if self.media.allowed_formats.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_VIDEO_FORMATS cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                port: 4000,
                environment: "development".to_string(),
                frontend_origin: "http://localhost:3000".to_string(),
                db_max_connections: 20,
                db_timeout_seconds: 30,
            },
            database_url: "postgresql://localhost/vidhub".to_string(),
            auth: AuthConfig {
                access_token_secret: "a".repeat(32),
                refresh_token_secret: "b".repeat(32),
                access_token_ttl_minutes: 15,
                refresh_token_ttl_days: 7,
                bcrypt_cost: 4,
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_path: Some("/tmp/vidhub".to_string()),
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
            },
            media: MediaConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                max_video_size_bytes: 500 * 1024 * 1024,
                allowed_formats: vec!["mp4".to_string(), "webm".to_string()],
            },
            queue: QueueConfig {
                database_url: None,
                worker_concurrency: 3,
                poll_interval_ms: 1000,
                max_attempts: 3,
                backoff_base_secs: 5,
                processing_timeout_seconds: 300,
                stalled_reap_interval_secs: 60,
                stalled_grace_period_secs: 60,
                retain_completed: 100,
                retain_failed: 200,
            },
            rate_limit: RateLimitConfig {
                per_minute: 100,
                auth_attempts: 5,
                auth_window_secs: 900,
                uploads_per_hour: 20,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn identical_secrets_rejected() {
        let mut config = base_config();
        config.auth.refresh_token_secret = config.auth.access_token_secret.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn short_secret_rejected() {
        let mut config = base_config();
        config.auth.access_token_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn s3_backend_requires_bucket() {
        let mut config = base_config();
        config.storage.backend = StorageBackend::S3;
        assert!(config.validate().is_err());
        config.storage.s3_bucket = Some("videos".to_string());
        config.storage.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn wildcard_origin_rejected_in_production() {
        let mut config = base_config();
        config.server.environment = "production".to_string();
        config.server.frontend_origin = "*".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn queue_url_falls_back_to_database_url() {
        let mut config = base_config();
        assert_eq!(config.queue_database_url(), "postgresql://localhost/vidhub");
        config.queue.database_url = Some("postgresql://localhost/queue".to_string());
        assert_eq!(config.queue_database_url(), "postgresql://localhost/queue");
    }
}
