use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::{
        BillingCustomerPort, CardId, CustomerId, SubscriptionGatewayPort, SubscriptionId,
        SubscriptionInfo, SubscriptionProperties,
    },
    domain::entities::subscriber::{BillingFields, SubscriberProfile},
};

use super::remote_subscription::RemoteSubscription;

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriberRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriberProfile>>;

    /// Persist the billing columns of a subscriber.
    async fn save(&self, subscriber: &SubscriberProfile) -> AppResult<()>;

    /// Subscribers bound to a gateway subscription, ordered by id, starting after `after`.
    async fn list_with_subscription(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<SubscriberProfile>>;
}

// ============================================================================
// Projection
// ============================================================================

/// Project a gateway snapshot onto the subscriber's billing columns.
///
/// An inactive snapshot describes a subscription that has lapsed or is pending
/// cancellation: the trial is dropped and the end date is the period end (or `now`).
pub fn project_subscription_info(info: &SubscriptionInfo, now: DateTime<Utc>) -> BillingFields {
    let mut fields = BillingFields {
        active: true,
        subscription: Some(info.id.as_str().to_string()),
        plan: info.plan.clone(),
        amount: info.amount.unwrap_or(0),
        interval: info.interval.clone(),
        quantity: info.quantity,
        card: info.card.as_ref().map(|c| c.as_str().to_string()),
        trial_ends_at: info.trial_ends_at,
        subscription_ends_at: None,
        discounts: info.discounts.clone(),
    };

    if !info.active {
        fields.active = false;
        fields.trial_ends_at = None;
        fields.subscription_ends_at = Some(info.period_ends_at.unwrap_or(now));
    }

    fields
}

async fn gateway_customer_of(
    customer: Option<&Arc<dyn BillingCustomerPort>>,
) -> AppResult<Option<CustomerId>> {
    match customer {
        Some(customer) => customer.gateway_customer().await,
        None => Ok(None),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`SubscriptionManager`].
///
/// `build` resolves the remote handle first (explicit handle, else the subscriber's stored
/// subscription id) and then the snapshot (explicit snapshot, else fetched from the handle).
pub struct SubscriptionManagerBuilder {
    subscriber: SubscriberProfile,
    plan: String,
    gateway: Arc<dyn SubscriptionGatewayPort>,
    repo: Arc<dyn SubscriberRepo>,
    customer: Option<Arc<dyn BillingCustomerPort>>,
    subscription: Option<RemoteSubscription>,
    info: Option<SubscriptionInfo>,
}

impl SubscriptionManagerBuilder {
    pub fn customer(mut self, customer: Arc<dyn BillingCustomerPort>) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn subscription(mut self, subscription: RemoteSubscription) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn info(mut self, info: SubscriptionInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Resolve the handle and snapshot. A failed snapshot fetch here is returned to the
    /// caller.
    pub async fn build(self) -> AppResult<SubscriptionManager> {
        let subscription = match self.subscription {
            Some(subscription) => Some(subscription),
            None => match self.subscriber.billing.subscription.as_deref() {
                Some(id) => {
                    let customer_ref = gateway_customer_of(self.customer.as_ref()).await?;
                    Some(RemoteSubscription::bind(
                        self.gateway.clone(),
                        Some(SubscriptionId::new(id)),
                        customer_ref,
                    ))
                }
                None => None,
            },
        };

        let info = match self.info {
            Some(info) => Some(info),
            None => match &subscription {
                Some(subscription) => subscription.info().await?,
                None => None,
            },
        };

        Ok(SubscriptionManager {
            subscriber: self.subscriber,
            plan: self.plan,
            gateway: self.gateway,
            repo: self.repo,
            customer: self.customer,
            subscription,
            info,
            pending: PendingConfig::default(),
        })
    }
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Debug, Default)]
struct PendingConfig {
    coupon: Option<String>,
    card_token: Option<String>,
    card: Option<CardId>,
    skip_trial: bool,
}

/// Drives one subscriber's subscription through its lifecycle and keeps the local billing
/// columns in line with the gateway.
///
/// Every mutating operation returns early without side effects when the subscriber is not in
/// a state the operation applies to. After a successful gateway mutation the operation calls
/// [`refresh`](Self::refresh); a failed mutation returns its error before anything is saved.
///
/// Not safe against concurrent operations on the same subscriber; callers serialize them.
pub struct SubscriptionManager {
    subscriber: SubscriberProfile,
    plan: String,
    gateway: Arc<dyn SubscriptionGatewayPort>,
    repo: Arc<dyn SubscriberRepo>,
    customer: Option<Arc<dyn BillingCustomerPort>>,
    subscription: Option<RemoteSubscription>,
    info: Option<SubscriptionInfo>,
    pending: PendingConfig,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriber_id", &self.subscriber.id)
            .field("plan", &self.plan)
            .field("subscription", &self.subscription)
            .field("pending", &self.pending)
            .finish()
    }
}

impl SubscriptionManager {
    pub fn builder(
        subscriber: SubscriberProfile,
        plan: impl Into<String>,
        gateway: Arc<dyn SubscriptionGatewayPort>,
        repo: Arc<dyn SubscriberRepo>,
    ) -> SubscriptionManagerBuilder {
        SubscriptionManagerBuilder {
            subscriber,
            plan: plan.into(),
            gateway,
            repo,
            customer: None,
            subscription: None,
            info: None,
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn with_coupon(&mut self, code: impl Into<String>) -> &mut Self {
        self.pending.coupon = Some(code.into());
        self
    }

    pub fn with_card_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.pending.card_token = Some(token.into());
        self
    }

    /// Use an existing card, given either its id or the card itself.
    pub fn with_card(&mut self, card: impl Into<CardId>) -> &mut Self {
        self.pending.card = Some(card.into());
        self
    }

    /// End any trial immediately on the next create/swap/quantity change.
    pub fn skip_trial(&mut self) -> &mut Self {
        self.pending.skip_trial = true;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn model(&self) -> &SubscriberProfile {
        &self.subscriber
    }

    pub fn into_model(self) -> SubscriberProfile {
        self.subscriber
    }

    pub fn plan(&self) -> &str {
        &self.plan
    }

    pub fn subscription(&self) -> Option<&RemoteSubscription> {
        self.subscription.as_ref()
    }

    /// The last snapshot fetched from the gateway.
    pub fn info(&self) -> Option<&SubscriptionInfo> {
        self.info.as_ref()
    }

    /// The last snapshot as a key/value map; empty when there is none.
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        match self.info.as_ref().map(serde_json::to_value) {
            Some(Ok(Value::Object(map))) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Whether the snapshot carries a non-null value for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Snapshot value for `key`; `None` for unknown keys and null values.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key).filter(|value| !value.is_null())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[instrument(skip(self, properties), fields(subscriber_id = %self.subscriber.id, plan = %self.plan))]
    pub async fn create(&mut self, properties: SubscriptionProperties) -> AppResult<&mut Self> {
        if self.subscriber.is_billing_active() {
            tracing::debug!("Subscriber already active, skipping create");
            return Ok(self);
        }

        let mut customer_ref = None;
        if let Some(customer) = self.customer.clone() {
            if !customer.ready_for_billing().await? {
                let provisioned = customer
                    .provision(self.pending.card_token.as_deref(), &properties)
                    .await?;
                tracing::debug!(customer_id = %provisioned.customer_id, "Provisioned gateway customer");
                if !provisioned.cards.is_empty() {
                    self.pending.card_token = None;
                }
            } else if self.pending.card_token.is_some() {
                self.consume_card_token(customer.as_ref()).await?;
            }
            customer_ref = customer.gateway_customer().await?;
        }

        let mut properties = properties;
        properties.absorb_reserved_extras();
        properties.trial_ends_at = self.trial_end();
        properties.coupon = self.pending.coupon.clone();
        properties.card_token = self.pending.card_token.clone();
        properties.card = self.pending.card.clone();

        let mut subscription = RemoteSubscription::bind(self.gateway.clone(), None, customer_ref);
        subscription.create(&self.plan, &properties).await?;
        self.subscription = Some(subscription);

        self.refresh().await
    }

    #[instrument(skip(self), fields(subscriber_id = %self.subscriber.id))]
    pub async fn cancel(&mut self, at_period_end: bool) -> AppResult<&mut Self> {
        if !self.subscriber.is_billing_active() {
            tracing::debug!("Subscriber not active, skipping cancel");
            return Ok(self);
        }

        self.bound_subscription()?.cancel(at_period_end).await?;

        self.refresh().await
    }

    /// Cancel at the end of the current billing period.
    pub async fn cancel_at_period_end(&mut self) -> AppResult<&mut Self> {
        self.cancel(true).await
    }

    #[instrument(skip(self), fields(subscriber_id = %self.subscriber.id, plan = %self.plan))]
    pub async fn resume(&mut self) -> AppResult<&mut Self> {
        if !self.subscriber.is_canceled() {
            tracing::debug!("Subscriber not canceled, skipping resume");
            return Ok(self);
        }

        let mut customer_ref = None;
        if let Some(customer) = self.customer.clone() {
            if self.pending.card_token.is_some() {
                self.consume_card_token(customer.as_ref()).await?;
            }
            customer_ref = customer.gateway_customer().await?;
        }

        let existing_id = self
            .subscriber
            .billing
            .subscription
            .as_deref()
            .map(SubscriptionId::new);
        let mut subscription =
            RemoteSubscription::bind(self.gateway.clone(), existing_id, customer_ref);

        let now = Utc::now();
        if subscription.info().await?.is_some() {
            let properties = SubscriptionProperties {
                plan: Some(self.plan.clone()),
                trial_ends_at: Some(now),
                prorate: Some(false),
                card_token: self.pending.card_token.clone(),
                card: self.pending.card.clone(),
                ..Default::default()
            };
            subscription.update(&properties).await?;
        } else {
            tracing::debug!("No remote subscription left to resume, creating a new one");
            let properties = SubscriptionProperties {
                trial_ends_at: Some(now),
                card_token: self.pending.card_token.clone(),
                card: self.pending.card.clone(),
                ..Default::default()
            };
            subscription.create(&self.plan, &properties).await?;
        }
        self.subscription = Some(subscription);

        self.refresh().await
    }

    /// Move the subscription to the target plan, keeping the current quantity unless one
    /// is given.
    #[instrument(skip(self), fields(subscriber_id = %self.subscriber.id, plan = %self.plan))]
    pub async fn swap(&mut self, quantity: Option<u32>) -> AppResult<&mut Self> {
        if !self.subscriber.is_billing_active() {
            tracing::debug!("Subscriber not active, skipping swap");
            return Ok(self);
        }

        let quantity = quantity.unwrap_or_else(|| self.remote_quantity());

        // An untrialed subscription must not pick up the new plan's trial.
        if self.subscriber.billing.trial_ends_at.is_none() {
            self.pending.skip_trial = true;
        }

        let properties = SubscriptionProperties {
            plan: Some(self.plan.clone()),
            quantity: Some(quantity),
            trial_ends_at: self.trial_end(),
            ..Default::default()
        };
        self.bound_subscription()?.update(&properties).await?;

        self.refresh().await
    }

    #[instrument(skip(self), fields(subscriber_id = %self.subscriber.id))]
    pub async fn increment(&mut self, count: u32) -> AppResult<&mut Self> {
        let quantity = self.remote_quantity().saturating_add(count);
        self.update_quantity(quantity).await
    }

    #[instrument(skip(self), fields(subscriber_id = %self.subscriber.id))]
    pub async fn decrement(&mut self, count: u32) -> AppResult<&mut Self> {
        let quantity = self.remote_quantity().saturating_sub(count);
        self.update_quantity(quantity).await
    }

    /// Pull the gateway's view of the subscription into the subscriber and save it.
    ///
    /// A failed fetch is logged and treated as "no subscription": the subscriber is cleared
    /// and saved, and no error is returned. Save failures are returned.
    #[instrument(skip(self), fields(subscriber_id = %self.subscriber.id))]
    pub async fn refresh(&mut self) -> AppResult<&mut Self> {
        let info = match &self.subscription {
            Some(subscription) => match subscription.info().await {
                Ok(info) => info,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        subscription_id = ?subscription.id(),
                        "Failed to fetch subscription info, treating subscription as absent"
                    );
                    None
                }
            },
            None => None,
        };

        self.apply(info).await
    }

    /// Apply the snapshot already held by the manager without fetching again.
    pub async fn reconcile(&mut self) -> AppResult<&mut Self> {
        let info = self.info.take();
        self.apply(info).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn apply(&mut self, info: Option<SubscriptionInfo>) -> AppResult<&mut Self> {
        self.subscriber.billing = match &info {
            Some(info) => project_subscription_info(info, Utc::now()),
            None => BillingFields::cleared(),
        };

        self.repo.save(&self.subscriber).await?;

        tracing::debug!(
            active = self.subscriber.billing.active,
            subscription_id = ?self.subscriber.billing.subscription,
            "Reconciled subscriber billing state"
        );

        self.info = info;
        Ok(self)
    }

    async fn update_quantity(&mut self, quantity: u32) -> AppResult<&mut Self> {
        if !self.subscriber.is_billing_active() {
            tracing::debug!("Subscriber not active, skipping quantity change");
            return Ok(self);
        }

        // Quantity changes stay on the subscriber's current plan.
        let properties = SubscriptionProperties {
            plan: self.subscriber.billing.plan.clone(),
            quantity: Some(quantity),
            trial_ends_at: self.trial_end(),
            ..Default::default()
        };
        self.bound_subscription()?.update(&properties).await?;

        self.refresh().await
    }

    async fn consume_card_token(&mut self, customer: &dyn BillingCustomerPort) -> AppResult<()> {
        if let Some(token) = self.pending.card_token.as_deref() {
            let card = customer.create_card(token).await?;
            tracing::debug!(card_id = %card.id, "Created card from token");
            self.pending.card = Some(card.id);
            self.pending.card_token = None;
        }
        Ok(())
    }

    fn bound_subscription(&mut self) -> AppResult<&mut RemoteSubscription> {
        self.subscription.as_mut().ok_or_else(|| {
            AppError::Gateway("No remote subscription bound to subscriber".into())
        })
    }

    fn remote_quantity(&self) -> u32 {
        self.info
            .as_ref()
            .map(|info| info.quantity)
            .unwrap_or(self.subscriber.billing.quantity)
    }

    fn trial_end(&self) -> Option<DateTime<Utc>> {
        if self.pending.skip_trial {
            Some(Utc::now())
        } else {
            self.subscriber.billing.trial_ends_at
        }
    }
}
