use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::net::IpAddr;

use crate::models::{RateLimitAction, RateLimitPolicy};

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub share: ShareConfig,
    pub otp: OtpConfig,
    pub content: ContentConfig,
    pub analytics: AnalyticsConfig,
    pub smtp: SmtpConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    /// Keys the device fingerprint hash; falls back to `secret` when unset.
    pub fingerprint_secret: Option<SecretString>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub share_token_expiry_hours: i64,
    pub reset_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Lifetime of a share session in the store and of its cookie.
    pub client_session_timeout_hours: i64,
    pub cookie_secure: bool,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub code_length: usize,
    pub expiry_minutes: i64,
    pub max_attempts: u64,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ContentConfig {
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub page_access_dedupe_minutes: i64,
    pub video_view_dedupe_minutes: i64,
    pub download_dedupe_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    /// Proxies allowed to report the client address via `x-forwarded-for`.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub policies: HashMap<RateLimitAction, RateLimitPolicy>,
}

impl RateLimitConfig {
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        self.policies
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_policy())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            policies: RateLimitAction::ALL
                .into_iter()
                .map(|a| (a, a.default_policy()))
                .collect(),
        }
    }
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("access-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: SecretString::new(get_env("JWT_SECRET", None, is_prod)?),
                fingerprint_secret: env::var("FINGERPRINT_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(SecretString::new),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?,
                share_token_expiry_hours: parse_env(
                    "JWT_SHARE_TOKEN_EXPIRY_HOURS",
                    "24",
                    is_prod,
                )?,
                reset_token_expiry_minutes: parse_env(
                    "JWT_RESET_TOKEN_EXPIRY_MINUTES",
                    "30",
                    is_prod,
                )?,
            },
            share: ShareConfig {
                client_session_timeout_hours: parse_env(
                    "SHARE_CLIENT_SESSION_TIMEOUT_HOURS",
                    "24",
                    is_prod,
                )?,
                cookie_secure: parse_env("SHARE_COOKIE_SECURE", "false", is_prod)?,
                public_base_url: get_env(
                    "PUBLIC_BASE_URL",
                    Some("http://localhost:3000"),
                    is_prod,
                )?,
            },
            otp: OtpConfig {
                code_length: parse_env("OTP_CODE_LENGTH", "6", is_prod)?,
                expiry_minutes: parse_env("OTP_EXPIRY_MINUTES", "10", is_prod)?,
                max_attempts: parse_env("OTP_MAX_ATTEMPTS", "5", is_prod)?,
                lockout_minutes: parse_env("OTP_LOCKOUT_MINUTES", "15", is_prod)?,
            },
            content: ContentConfig {
                token_ttl_minutes: parse_env("CONTENT_TOKEN_TTL_MINUTES", "10", is_prod)?,
            },
            analytics: AnalyticsConfig {
                page_access_dedupe_minutes: parse_env(
                    "ANALYTICS_PAGE_ACCESS_DEDUPE_MINUTES",
                    "30",
                    is_prod,
                )?,
                video_view_dedupe_minutes: parse_env(
                    "ANALYTICS_VIDEO_VIEW_DEDUPE_MINUTES",
                    "360",
                    is_prod,
                )?,
                download_dedupe_minutes: parse_env(
                    "ANALYTICS_DOWNLOAD_DEDUPE_MINUTES",
                    "60",
                    is_prod,
                )?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_address: get_env(
                    "SMTP_FROM_ADDRESS",
                    Some("no-reply@localhost"),
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "300", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
                trusted_proxies: parse_ip_list("TRUSTED_PROXIES")?,
            },
            rate_limit: load_rate_limit_policies()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.secret.expose_secret().len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.share.client_session_timeout_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SHARE_CLIENT_SESSION_TIMEOUT_HOURS must be positive"
            )));
        }

        if self.content.token_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CONTENT_TOKEN_TTL_MINUTES must be positive"
            )));
        }

        if !(4..=10).contains(&self.otp.code_length) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_CODE_LENGTH must be between 4 and 10"
            )));
        }

        for (action, policy) in &self.rate_limit.policies {
            if policy.max_requests == 0 || policy.window_seconds == 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Rate limit policy for {} must have a positive max and window",
                    action.as_str()
                )));
            }
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.share.cookie_secure {
                tracing::error!("SHARE_COOKIE_SECURE is false in production");
            }
        }

        Ok(())
    }

    /// Secret used to key device fingerprint hashes.
    pub fn fingerprint_secret(&self) -> &SecretString {
        self.jwt
            .fingerprint_secret
            .as_ref()
            .unwrap_or(&self.jwt.secret)
    }
}

fn load_rate_limit_policies() -> Result<RateLimitConfig, AppError> {
    let mut policies = HashMap::new();
    for action in RateLimitAction::ALL {
        let defaults = action.default_policy();
        let prefix = format!("RATE_LIMIT_{}", action.as_str().to_ascii_uppercase());
        let max_requests = env_override(&format!("{}_MAX", prefix), defaults.max_requests)?;
        let window_seconds =
            env_override(&format!("{}_WINDOW_SECONDS", prefix), defaults.window_seconds)?;
        policies.insert(action, RateLimitPolicy::new(max_requests, window_seconds));
    }
    Ok(RateLimitConfig { policies })
}

fn env_override(key: &str, default: u64) -> Result<u64, AppError> {
    match env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e))
            }),
        Err(_) => Ok(default),
    }
}

/// Comma-separated addresses; unset means no proxy is trusted.
fn parse_ip_list(key: &str) -> Result<Vec<IpAddr>, AppError> {
    let Ok(raw) = env::var(key) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}: {}: {}", key, s, e)))
        })
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Fully populated configuration for unit tests.
#[cfg(test)]
pub(crate) fn test_config() -> AccessConfig {
    AccessConfig {
        common: core_config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/access_test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        jwt: JwtConfig {
            secret: SecretString::new("0123456789abcdef0123456789abcdef".to_string()),
            fingerprint_secret: None,
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            share_token_expiry_hours: 24,
            reset_token_expiry_minutes: 30,
        },
        share: ShareConfig {
            client_session_timeout_hours: 24,
            cookie_secure: false,
            public_base_url: "http://localhost:3000".to_string(),
        },
        otp: OtpConfig {
            code_length: 6,
            expiry_minutes: 10,
            max_attempts: 5,
            lockout_minutes: 15,
        },
        content: ContentConfig {
            token_ttl_minutes: 10,
        },
        analytics: AnalyticsConfig {
            page_access_dedupe_minutes: 30,
            video_view_dedupe_minutes: 360,
            download_dedupe_minutes: 60,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: SecretString::new(String::new()),
            from_address: "no-reply@localhost".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            global_ip_limit: 300,
            global_ip_window_seconds: 60,
            trusted_proxies: Vec::new(),
        },
        rate_limit: RateLimitConfig::default(),
    }
}
