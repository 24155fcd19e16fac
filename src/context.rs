/// Application context and dependency injection
use crate::{
    account::AccountManager,
    analytics::Analytics,
    cache::CacheClient,
    config::AppConfig,
    content::{records::ContentRecordStore, ContentService},
    db,
    error::{ApiError, ApiResult},
    feedback::FeedbackService,
    moderation::{keywords::KeywordIndex, ModerationService, RemoteModerationClient},
    orders::OrderService,
    payment::PaymentGateway,
    providers::ProviderGroup,
    quota::{
        store::{CounterStore, MemoryCounterStore, RedisCounterStore},
        QuotaLedger,
    },
    rate_limit::RateLimiter,
    scenario::ScenarioCatalog,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub quota: Arc<QuotaLedger>,
    pub orders: Arc<OrderService>,
    pub payment: Option<Arc<PaymentGateway>>,
    pub catalog: Arc<ScenarioCatalog>,
    pub moderation: Arc<ModerationService>,
    pub content: Arc<ContentService>,
    pub analytics: Arc<Analytics>,
    pub feedback: Arc<FeedbackService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: AppConfig) -> ApiResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.storage.data_directory)
            .await
            .map_err(|e| {
                ApiError::Internal(format!(
                    "Failed to create data directory {}: {}",
                    config.storage.data_directory.display(),
                    e
                ))
            })?;

        let pool =
            db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        // With the cache disabled, daily counters live in-process; that
        // trades midnight-accurate multi-node behavior for zero
        // dependencies, fine for single-node deployments.
        let (cache, counter): (Option<CacheClient>, Arc<dyn CounterStore>) = if config.cache.enabled
        {
            let cache = CacheClient::new(config.cache.clone()).await?;
            cache.ping().await?;
            (
                Some(cache.clone()),
                Arc::new(RedisCounterStore::new(cache)),
            )
        } else {
            info!("Cache disabled, using in-process quota counters");
            (None, Arc::new(MemoryCounterStore::new()))
        };

        let accounts = Arc::new(AccountManager::new(
            pool.clone(),
            config.auth.clone(),
            config.wechat.clone(),
        )?);

        let quota = Arc::new(QuotaLedger::new(
            pool.clone(),
            counter,
            config.quota.clone(),
        ));

        let orders = Arc::new(OrderService::new(pool.clone(), config.pricing.clone()));

        let payment = match &config.wechat {
            Some(wechat) if !wechat.mch_id.is_empty() => Some(Arc::new(PaymentGateway::new(
                wechat.clone(),
                config.service.app_name.clone(),
            )?)),
            _ => {
                info!("Payment gateway not configured");
                None
            }
        };

        let catalog = Arc::new(ScenarioCatalog::new(
            pool.clone(),
            cache,
            config.cache.catalog_ttl,
        ));

        let keywords = Arc::new(KeywordIndex::load(pool.clone()).await?);
        let remote_moderation = match &config.wechat {
            Some(wechat) if !wechat.app_secret.is_empty() => {
                Some(RemoteModerationClient::new(wechat.clone())?)
            }
            _ => None,
        };
        let moderation = Arc::new(ModerationService::new(keywords, remote_moderation));

        let providers = Arc::new(ProviderGroup::from_config(&config.ai)?);
        if providers.is_empty() {
            info!("No generation providers configured; generation requests will fail");
        } else {
            info!(providers = ?providers.provider_names(), "generation providers ready");
        }

        let analytics = Arc::new(Analytics::new(pool.clone()));

        let content = Arc::new(ContentService::new(
            Arc::clone(&quota),
            Arc::clone(&catalog),
            Arc::clone(&moderation),
            providers,
            ContentRecordStore::new(pool.clone()),
            Arc::clone(&analytics),
            config.ai.temperature,
        ));

        let feedback = Arc::new(FeedbackService::new(pool.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            accounts,
            quota,
            orders,
            payment,
            catalog,
            moderation,
            content,
            analytics,
            feedback,
            rate_limiter,
        })
    }
}
