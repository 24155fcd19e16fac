/// Configuration management for the Copymint backend
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub wechat: Option<WechatConfig>,
    pub ai: AiConfig,
    pub quota: QuotaConfig,
    pub pricing: PricingConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub app_name: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Cache / counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When disabled, quota counters fall back to an in-process store
    pub enabled: bool,
    pub redis_url: String,
    pub key_prefix: String,
    /// TTL for read-through catalog caches (scenarios, tone styles)
    pub catalog_ttl: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Shared secret for keyword administration; unset disables the
    /// admin endpoints
    pub admin_token: Option<String>,
}

/// WeChat platform configuration: mini-program identity, content
/// security and the pay merchant account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    pub app_id: String,
    pub app_secret: String,
    pub mch_id: String,
    pub api_key: String,
    pub notify_url: String,
}

/// One LLM provider endpoint (chat-completions shaped)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

/// LLM provider configuration: primary plus ordered fallbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub providers: Vec<ProviderConfig>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

/// Daily allowance per membership tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub free_daily: i64,
    pub monthly_daily: i64,
    pub yearly_daily: i64,
}

/// Fixed price table, amounts in cents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub monthly_cents: i64,
    pub yearly_cents: i64,
    pub per_use_cents: i64,
    /// PENDING orders older than this get cancelled by the background job
    pub order_timeout_minutes: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env_or("COPYMINT_HOSTNAME", "0.0.0.0");
        let port = env_parse("COPYMINT_PORT", 3000u16);
        let app_name = env_or("COPYMINT_APP_NAME", "copymint");

        let data_directory: PathBuf = env_or("COPYMINT_DATA_DIRECTORY", "./data").into();
        let database = env::var("COPYMINT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("copymint.sqlite"));

        let cache = CacheConfig {
            enabled: env_parse("CACHE_ENABLED", false),
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            key_prefix: env_or("CACHE_KEY_PREFIX", "copymint:"),
            catalog_ttl: env_parse("CACHE_CATALOG_TTL", 300u64),
        };

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;
        let token_ttl_days = env_parse("JWT_TOKEN_TTL_DAYS", 7i64);
        let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        // WeChat is optional: without it, login, payment and remote
        // moderation are unavailable but the rest of the service runs.
        let wechat = match env::var("WECHAT_APP_ID") {
            Ok(app_id) if !app_id.is_empty() => Some(WechatConfig {
                app_id,
                app_secret: env_or("WECHAT_APP_SECRET", ""),
                mch_id: env_or("WECHAT_MCH_ID", ""),
                api_key: env_or("WECHAT_API_KEY", ""),
                notify_url: env_or("WECHAT_PAYMENT_NOTIFY_URL", ""),
            }),
            _ => None,
        };

        let ai = AiConfig {
            providers: Self::providers_from_env(),
            timeout_secs: env_parse("AI_TIMEOUT_SECS", 10u64),
            temperature: env_parse("AI_TEMPERATURE", 0.7f32),
        };

        let quota = QuotaConfig {
            free_daily: env_parse("QUOTA_FREE_DAILY", 20i64),
            monthly_daily: env_parse("QUOTA_MONTHLY_DAILY", 50i64),
            yearly_daily: env_parse("QUOTA_YEARLY_DAILY", 99_999i64),
        };

        let pricing = PricingConfig {
            monthly_cents: env_parse("PRICE_MONTHLY_CENTS", 2990i64),
            yearly_cents: env_parse("PRICE_YEARLY_CENTS", 19_900i64),
            per_use_cents: env_parse("PRICE_PER_USE_CENTS", 200i64),
            order_timeout_minutes: env_parse("ORDER_TIMEOUT_MINUTES", 30i64),
        };

        let rate_limit = RateLimitConfig {
            enabled: env_parse("RATE_LIMITS_ENABLED", true),
            authenticated_rps: env_parse("RATE_LIMIT_AUTHENTICATED_RPS", 50u32),
            unauthenticated_rps: env_parse("RATE_LIMIT_UNAUTHENTICATED_RPS", 10u32),
            burst_size: env_parse("RATE_LIMIT_BURST_SIZE", 20u32),
        };

        let logging = LoggingConfig {
            level: env_or("RUST_LOG", "info"),
        };

        Ok(AppConfig {
            service: ServiceConfig {
                hostname,
                port,
                app_name,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            cache,
            auth: AuthConfig {
                jwt_secret,
                token_ttl_days,
                admin_token,
            },
            wechat,
            ai,
            quota,
            pricing,
            rate_limit,
            logging,
        })
    }

    /// Build the ordered provider list: primary first, then fallbacks.
    /// A provider is only included when its API key is configured.
    fn providers_from_env() -> Vec<ProviderConfig> {
        let mut providers = Vec::new();

        let entries = [
            (
                "deepseek",
                "DEEPSEEK_API_KEY",
                "DEEPSEEK_API_URL",
                "https://api.deepseek.com/v1",
                "DEEPSEEK_MODEL",
                "deepseek-chat",
            ),
            (
                "siliconflow",
                "SILICONFLOW_API_KEY",
                "SILICONFLOW_API_URL",
                "https://api.siliconflow.cn/v1",
                "SILICONFLOW_MODEL",
                "deepseek-ai/DeepSeek-V2.5",
            ),
            (
                "groq",
                "GROQ_API_KEY",
                "GROQ_API_URL",
                "https://api.groq.com/openai/v1",
                "GROQ_MODEL",
                "llama-3.1-70b-versatile",
            ),
        ];

        let primary = env_or("AI_PRIMARY_PROVIDER", "deepseek");
        let fallbacks = env_or("AI_FALLBACK_PROVIDERS", "siliconflow,groq");
        let mut order: Vec<&str> = vec![primary.as_str()];
        order.extend(fallbacks.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()));

        for name in order {
            if let Some(entry) = entries.iter().find(|e| e.0 == name) {
                let key = env_or(entry.1, "").trim().to_string();
                if key.len() > 10 {
                    providers.push(ProviderConfig {
                        name: entry.0.to_string(),
                        api_url: env_or(entry.2, entry.3),
                        api_key: key,
                        model: env_or(entry.4, entry.5),
                    });
                }
            }
        }

        providers
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.quota.free_daily < 0 || self.quota.monthly_daily < 0 || self.quota.yearly_daily < 0
        {
            return Err(ApiError::Validation(
                "Daily quotas cannot be negative".to_string(),
            ));
        }

        if self.pricing.per_use_cents <= 0 {
            return Err(ApiError::Validation(
                "Per-use price must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_jwt_secret() {
        let mut config = test_config();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    fn test_config() -> AppConfig {
        AppConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3000,
                app_name: "copymint".to_string(),
            },
            storage: StorageConfig {
                data_directory: "./data".into(),
                database: "./data/copymint.sqlite".into(),
            },
            cache: CacheConfig {
                enabled: false,
                redis_url: "redis://localhost:6379".to_string(),
                key_prefix: "copymint:".to_string(),
                catalog_ttl: 300,
            },
            auth: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                token_ttl_days: 7,
                admin_token: None,
            },
            wechat: None,
            ai: AiConfig {
                providers: vec![],
                timeout_secs: 10,
                temperature: 0.7,
            },
            quota: QuotaConfig {
                free_daily: 20,
                monthly_daily: 50,
                yearly_daily: 99_999,
            },
            pricing: PricingConfig {
                monthly_cents: 2990,
                yearly_cents: 19_900,
                per_use_cents: 200,
                order_timeout_minutes: 30,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                authenticated_rps: 50,
                unauthenticated_rps: 10,
                burst_size: 20,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
