use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::AppResult,
    application::{
        ports::billing_gateway::SubscriptionGatewayPort,
        use_cases::{
            subscription_manager::{SubscriberRepo, SubscriptionManagerBuilder},
            subscriptions::{SubscriptionUseCases, SyncReport},
        },
    },
    domain::entities::subscriber::SubscriberProfile,
    infra::config::{BillingConfig, LogFormat},
};

/// Everything needed to run subscription operations against one gateway and database.
#[derive(Clone)]
pub struct BillingContext {
    pub config: Arc<BillingConfig>,
    pub persistence: Arc<PostgresPersistence>,
    pub subscriptions: Arc<SubscriptionUseCases>,
}

impl BillingContext {
    pub fn subscription(
        &self,
        subscriber: SubscriberProfile,
        plan: impl Into<String>,
    ) -> SubscriptionManagerBuilder {
        self.subscriptions.subscription(subscriber, plan)
    }

    /// Reconcile every subscriber with a stored subscription, using the configured batch size.
    pub async fn sync_all(&self) -> AppResult<SyncReport> {
        self.subscriptions.sync_all(self.config.sync_batch_size).await
    }
}

/// Load `.env` (if present) and read the configuration from the environment.
pub fn load_config() -> BillingConfig {
    dotenvy::dotenv().ok();
    BillingConfig::from_env()
}

pub async fn init_billing_context(
    config: BillingConfig,
    gateway: Arc<dyn SubscriptionGatewayPort>,
) -> anyhow::Result<BillingContext> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            anyhow::anyhow!("Postgres connection failed (check DATABASE_URL/password): {e}")
        })?;
    info!("Connected to database!");

    let persistence = Arc::new(PostgresPersistence::new(pool));
    let subscriptions =
        SubscriptionUseCases::new(gateway, persistence.clone() as Arc<dyn SubscriberRepo>);

    Ok(BillingContext {
        config: Arc::new(config),
        persistence,
        subscriptions: Arc::new(subscriptions),
    })
}

pub fn init_tracing(config: &BillingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(false) // don't show target (module path)
                .with_level(true)
                .pretty();
            registry.with(console_layer).try_init().ok();
        }
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true);
            registry.with(json_layer).try_init().ok();
        }
    }
}
