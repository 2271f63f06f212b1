use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::{
        CustomerId, SubscriptionGatewayPort, SubscriptionId, SubscriptionInfo,
        SubscriptionProperties,
    },
};

/// Handle to one subscription at the gateway.
///
/// A handle may be unbound (no id yet); `create` binds it to the subscription the gateway
/// returns. Mutations on an unbound handle fail rather than guessing a target.
#[derive(Clone)]
pub struct RemoteSubscription {
    gateway: Arc<dyn SubscriptionGatewayPort>,
    id: Option<SubscriptionId>,
    customer: Option<CustomerId>,
}

impl std::fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("id", &self.id)
            .field("customer", &self.customer)
            .finish()
    }
}

impl RemoteSubscription {
    pub fn bind(
        gateway: Arc<dyn SubscriptionGatewayPort>,
        id: Option<SubscriptionId>,
        customer: Option<CustomerId>,
    ) -> Self {
        Self {
            gateway,
            id,
            customer,
        }
    }

    pub fn id(&self) -> Option<&SubscriptionId> {
        self.id.as_ref()
    }

    pub fn customer(&self) -> Option<&CustomerId> {
        self.customer.as_ref()
    }

    fn require_id(&self) -> AppResult<&SubscriptionId> {
        self.id.as_ref().ok_or_else(|| {
            AppError::Gateway("Subscription handle is not bound to a remote subscription".into())
        })
    }

    pub async fn create(
        &mut self,
        plan: &str,
        properties: &SubscriptionProperties,
    ) -> AppResult<&mut Self> {
        let id = self
            .gateway
            .create_subscription(self.customer.as_ref(), plan, properties)
            .await?;
        tracing::debug!(subscription_id = %id, plan = %plan, "Created remote subscription");
        self.id = Some(id);
        Ok(self)
    }

    pub async fn update(&mut self, properties: &SubscriptionProperties) -> AppResult<&mut Self> {
        let id = self.require_id()?;
        self.gateway.update_subscription(id, properties).await?;
        tracing::debug!(subscription_id = %id, "Updated remote subscription");
        Ok(self)
    }

    pub async fn cancel(&mut self, at_period_end: bool) -> AppResult<&mut Self> {
        let id = self.require_id()?;
        self.gateway.cancel_subscription(id, at_period_end).await?;
        tracing::debug!(subscription_id = %id, at_period_end, "Canceled remote subscription");
        Ok(self)
    }

    /// Current gateway state; `None` when unbound or unknown to the gateway.
    pub async fn info(&self) -> AppResult<Option<SubscriptionInfo>> {
        match &self.id {
            Some(id) => self.gateway.get_subscription(id).await,
            None => Ok(None),
        }
    }
}
