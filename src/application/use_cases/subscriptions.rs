use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::SubscriptionGatewayPort,
    domain::entities::subscriber::SubscriberProfile,
};

use super::subscription_manager::{SubscriberRepo, SubscriptionManager, SubscriptionManagerBuilder};

/// Outcome of a batch reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Subscribers whose billing columns were rewritten
    pub synced: usize,
    /// Of those, subscribers left without an active subscription
    pub inactive: usize,
    /// Subscribers skipped because the gateway lookup or save failed
    pub failed: usize,
}

#[derive(Clone)]
pub struct SubscriptionUseCases {
    gateway: Arc<dyn SubscriptionGatewayPort>,
    repo: Arc<dyn SubscriberRepo>,
}

impl SubscriptionUseCases {
    pub fn new(gateway: Arc<dyn SubscriptionGatewayPort>, repo: Arc<dyn SubscriberRepo>) -> Self {
        Self { gateway, repo }
    }

    /// Start building a manager for `subscriber` targeting `plan`.
    pub fn subscription(
        &self,
        subscriber: SubscriberProfile,
        plan: impl Into<String>,
    ) -> SubscriptionManagerBuilder {
        SubscriptionManager::builder(subscriber, plan, self.gateway.clone(), self.repo.clone())
    }

    /// Load a subscriber by id and start building a manager for it.
    pub async fn subscription_for(
        &self,
        subscriber_id: Uuid,
        plan: impl Into<String>,
    ) -> AppResult<SubscriptionManagerBuilder> {
        let subscriber = self
            .repo
            .get_by_id(subscriber_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(self.subscription(subscriber, plan))
    }

    /// Reconcile every subscriber bound to a gateway subscription, `batch_size` at a time.
    ///
    /// Unlike [`SubscriptionManager::refresh`], a failed lookup leaves the subscriber untouched
    /// and is counted in [`SyncReport::failed`].
    #[instrument(skip(self))]
    pub async fn sync_all(&self, batch_size: i64) -> AppResult<SyncReport> {
        if batch_size <= 0 {
            return Err(AppError::InvalidInput(
                "Sync batch size must be positive".into(),
            ));
        }

        let mut report = SyncReport::default();
        let mut after: Option<Uuid> = None;

        loop {
            let page = self.repo.list_with_subscription(after, batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            let page_len = page.len();

            for subscriber in page {
                let subscriber_id = subscriber.id;
                match self.sync_one(subscriber).await {
                    Ok(active) => {
                        report.synced += 1;
                        if !active {
                            report.inactive += 1;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            subscriber_id = %subscriber_id,
                            error = %err,
                            "Failed to sync subscriber"
                        );
                        report.failed += 1;
                    }
                }
            }

            if (page_len as i64) < batch_size {
                break;
            }
        }

        tracing::info!(
            synced = report.synced,
            inactive = report.inactive,
            failed = report.failed,
            "Subscriber sync finished"
        );
        Ok(report)
    }

    async fn sync_one(&self, subscriber: SubscriberProfile) -> AppResult<bool> {
        let plan = subscriber.billing.plan.clone().unwrap_or_default();
        let mut manager = self.subscription(subscriber, plan).build().await?;
        manager.reconcile().await?;
        Ok(manager.model().is_billing_active())
    }
}
