//! ThiCode chat core composition root
//!
//! Wires configuration, the Postgres pool, the shared cache, and the LLM
//! provider into the conversation services.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thicode_cache::{
    CacheConfig, CacheServiceFactory, CacheStore, CircuitBreaker, CircuitBreakerConfig,
    LockManager,
};
use thicode_common::config::Config;
use thicode_common::RetryPolicy;
use thicode_conversations::{
    ChatService, ConversationService, ConversationStore, MessageService, PgConversationStore,
};
use thicode_llm::{LlmConfig, LlmService, LlmServiceFactory};

/// Tunables shared by the services
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub lock_ttl: std::time::Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl ServiceSettings {
    pub fn from_env() -> Self {
        Self {
            lock_ttl: LockManager::ttl_from_env(),
            retry: RetryPolicy::from_env(),
            breaker: CircuitBreakerConfig::from_env(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            lock_ttl: thicode_cache::lock::DEFAULT_LOCK_TTL,
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// The assembled service layer
#[derive(Clone)]
pub struct Services {
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub chat: ChatService,
    pub breaker: CircuitBreaker,
}

/// Build the services from already-constructed backends
pub fn build_services(
    store: Arc<dyn ConversationStore>,
    cache: Arc<dyn CacheStore>,
    llm: Arc<dyn LlmService>,
    settings: ServiceSettings,
) -> Services {
    let locks = LockManager::new(cache.clone(), settings.lock_ttl);
    let breaker = CircuitBreaker::new(cache, settings.breaker);

    let conversations = ConversationService::new(store.clone(), locks.clone(), settings.retry);
    let messages = MessageService::new(store, locks);
    let chat = ChatService::new(
        conversations.clone(),
        messages.clone(),
        llm,
        breaker.clone(),
        settings.retry,
    );

    Services {
        conversations,
        messages,
        chat,
        breaker,
    }
}

pub async fn connect_database(config: &Config) -> Result<PgPool, anyhow::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Database connection failed: {}", e))?;
    Ok(pool)
}

/// Create the services from environment configuration
pub async fn create_services(pool: PgPool) -> Result<Services, anyhow::Error> {
    let cache_config = CacheConfig::from_env()?;
    let cache: Arc<dyn CacheStore> = Arc::from(CacheServiceFactory::create(cache_config).await?);

    let llm_config = LlmConfig::from_env()?;
    let llm: Arc<dyn LlmService> = Arc::from(LlmServiceFactory::create(llm_config)?);

    let store: Arc<dyn ConversationStore> = Arc::new(PgConversationStore::new(pool));

    Ok(build_services(store, cache, llm, ServiceSettings::from_env()))
}
