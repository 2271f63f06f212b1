use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::{
        BillingCustomerPort, CardId, CardRef, CustomerId, ProvisionedCustomer,
        SubscriptionGatewayPort, SubscriptionId, SubscriptionInfo, SubscriptionProperties,
    },
    domain::entities::{payment_scenario::PaymentScenario, subscriber::Discount},
};

/// A plan known to the dummy gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyPlan {
    /// Price per interval in minor currency units
    pub amount: i64,
    /// "day", "week", "month" or "year"
    pub interval: String,
    pub trial_days: i64,
}

impl DummyPlan {
    pub fn new(amount: i64, interval: &str, trial_days: i64) -> Self {
        Self {
            amount,
            interval: interval.to_string(),
            trial_days,
        }
    }

    fn period_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self.interval.as_str() {
            "day" => start + Duration::days(1),
            "week" => start + Duration::weeks(1),
            "year" => start + Duration::days(365),
            _ => start + Duration::days(30), // Default to monthly
        }
    }
}

#[derive(Debug, Clone)]
struct DummySubscription {
    plan: String,
    quantity: u32,
    card: Option<CardId>,
    trial_ends_at: Option<DateTime<Utc>>,
    period_started_at: DateTime<Utc>,
    period_ends_at: DateTime<Utc>,
    cancel_at_period_end: bool,
    ended_at: Option<DateTime<Utc>>,
    discounts: Vec<Discount>,
}

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("Dummy gateway state poisoned".into()))
}

/// Fail with the scenario's decline message when the token encodes a failing card.
fn check_card_token(token: &str) -> AppResult<()> {
    match PaymentScenario::from_card_token(token).error_message() {
        Some(message) => Err(AppError::PaymentDeclined(message.to_string())),
        None => Ok(()),
    }
}

fn new_card() -> CardRef {
    CardRef {
        id: CardId::new(format!("dummy_card_{}", Uuid::new_v4())),
        brand: Some("visa".to_string()),
        last4: Some("4242".to_string()),
    }
}

/// Resolve the trial end for a new subscription: an explicit past or present end means no
/// trial, an explicit future end is kept, and no value falls back to the plan's trial.
fn resolve_trial(
    requested: Option<DateTime<Utc>>,
    plan: &DummyPlan,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match requested {
        Some(ends) if ends > now => Some(ends),
        Some(_) => None,
        None if plan.trial_days > 0 => Some(now + Duration::days(plan.trial_days)),
        None => None,
    }
}

/// In-memory billing gateway for test mode.
///
/// Simulates subscription management locally. Card tokens select a [`PaymentScenario`]
/// (`tok_decline`, `tok_expired_card`, ...); every other token is accepted. Canceling at
/// period end keeps the subscription until an update resumes it, canceling immediately ends
/// it for good.
pub struct DummyGateway {
    plans: HashMap<String, DummyPlan>,
    subscriptions: Mutex<HashMap<SubscriptionId, DummySubscription>>,
}

impl Default for DummyGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyGateway {
    /// Gateway with the `basic`, `pro` and `enterprise` monthly plans; `pro` has a 14-day trial.
    pub fn new() -> Self {
        Self::with_plans(HashMap::from([
            ("basic".to_string(), DummyPlan::new(999, "month", 0)),
            ("pro".to_string(), DummyPlan::new(2900, "month", 14)),
            ("enterprise".to_string(), DummyPlan::new(9900, "month", 0)),
        ]))
    }

    pub fn with_plans(plans: HashMap<String, DummyPlan>) -> Self {
        Self {
            plans,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn plan(&self, code: &str) -> AppResult<&DummyPlan> {
        self.plans
            .get(code)
            .ok_or_else(|| AppError::Gateway(format!("No such plan: '{}'", code)))
    }

    fn generate_subscription_id(&self) -> SubscriptionId {
        SubscriptionId::new(format!("dummy_sub_{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl SubscriptionGatewayPort for DummyGateway {
    async fn create_subscription(
        &self,
        customer: Option<&CustomerId>,
        plan: &str,
        properties: &SubscriptionProperties,
    ) -> AppResult<SubscriptionId> {
        let plan_info = self.plan(plan)?;
        if let Some(token) = properties.card_token.as_deref() {
            check_card_token(token)?;
        }

        let now = Utc::now();
        let trial_ends_at = resolve_trial(properties.trial_ends_at, plan_info, now);
        let period_started_at = now;
        let period_ends_at = plan_info.period_end(trial_ends_at.unwrap_or(now));
        let card = match (&properties.card, &properties.card_token) {
            (Some(card), _) => Some(card.clone()),
            (None, Some(_)) => Some(new_card().id),
            (None, None) => None,
        };
        let discounts = properties
            .coupon
            .iter()
            .map(|coupon| Discount {
                coupon: coupon.clone(),
                amount_off: None,
                percent_off: None,
                started_at: Some(now),
                ends_at: None,
            })
            .collect();

        let id = self.generate_subscription_id();
        lock(&self.subscriptions)?.insert(
            id.clone(),
            DummySubscription {
                plan: plan.to_string(),
                quantity: properties.quantity.unwrap_or(1),
                card,
                trial_ends_at,
                period_started_at,
                period_ends_at,
                cancel_at_period_end: false,
                ended_at: None,
                discounts,
            },
        );

        tracing::debug!(
            subscription_id = %id,
            customer_id = ?customer,
            plan = %plan,
            "Dummy: Created subscription"
        );
        Ok(id)
    }

    async fn update_subscription(
        &self,
        subscription_id: &SubscriptionId,
        properties: &SubscriptionProperties,
    ) -> AppResult<()> {
        if let Some(plan) = properties.plan.as_deref() {
            self.plan(plan)?;
        }
        if let Some(token) = properties.card_token.as_deref() {
            check_card_token(token)?;
        }

        let now = Utc::now();
        let mut subscriptions = lock(&self.subscriptions)?;
        let subscription = subscriptions.get_mut(subscription_id).ok_or_else(|| {
            AppError::Gateway(format!("No such subscription: '{}'", subscription_id))
        })?;
        if subscription.ended_at.is_some() {
            return Err(AppError::Gateway(format!(
                "Subscription '{}' has been canceled and cannot be updated",
                subscription_id
            )));
        }

        if let Some(plan) = &properties.plan {
            subscription.plan = plan.clone();
        }
        if let Some(quantity) = properties.quantity {
            subscription.quantity = quantity;
        }
        if let Some(ends) = properties.trial_ends_at {
            subscription.trial_ends_at = (ends > now).then_some(ends);
        }
        if let Some(card) = &properties.card {
            subscription.card = Some(card.clone());
        } else if properties.card_token.is_some() {
            subscription.card = Some(new_card().id);
        }
        if let Some(coupon) = &properties.coupon {
            subscription.discounts = vec![Discount {
                coupon: coupon.clone(),
                amount_off: None,
                percent_off: None,
                started_at: Some(now),
                ends_at: None,
            }];
        }
        // Any update on a subscription pending cancellation reactivates it.
        subscription.cancel_at_period_end = false;

        tracing::debug!(subscription_id = %subscription_id, "Dummy: Updated subscription");
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<()> {
        let mut subscriptions = lock(&self.subscriptions)?;
        let subscription = subscriptions.get_mut(subscription_id).ok_or_else(|| {
            AppError::Gateway(format!("No such subscription: '{}'", subscription_id))
        })?;

        if at_period_end {
            subscription.cancel_at_period_end = true;
        } else {
            subscription.ended_at = Some(Utc::now());
        }

        tracing::debug!(
            subscription_id = %subscription_id,
            at_period_end,
            "Dummy: Canceled subscription"
        );
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Option<SubscriptionInfo>> {
        let subscriptions = lock(&self.subscriptions)?;
        let Some(subscription) = subscriptions.get(subscription_id) else {
            return Ok(None);
        };
        let plan = self.plans.get(&subscription.plan);

        Ok(Some(SubscriptionInfo {
            id: subscription_id.clone(),
            plan: Some(subscription.plan.clone()),
            amount: plan.map(|p| p.amount),
            interval: plan.map(|p| p.interval.clone()),
            quantity: subscription.quantity,
            card: subscription.card.clone(),
            trial_ends_at: subscription.trial_ends_at,
            active: subscription.ended_at.is_none() && !subscription.cancel_at_period_end,
            period_started_at: Some(subscription.period_started_at),
            period_ends_at: Some(subscription.ended_at.unwrap_or(subscription.period_ends_at)),
            discounts: (!subscription.discounts.is_empty())
                .then(|| subscription.discounts.clone()),
        }))
    }
}

// ============================================================================
// DummyCustomer
// ============================================================================

#[derive(Debug, Default)]
struct DummyCustomerState {
    customer_id: Option<CustomerId>,
    cards: Vec<CardRef>,
}

/// In-memory customer paired with [`DummyGateway`].
#[derive(Debug, Default)]
pub struct DummyCustomer {
    state: Mutex<DummyCustomerState>,
}

impl DummyCustomer {
    /// A customer not yet known to the gateway.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provisioned(customer_id: &str) -> Self {
        Self {
            state: Mutex::new(DummyCustomerState {
                customer_id: Some(CustomerId::new(customer_id)),
                cards: Vec::new(),
            }),
        }
    }

    pub fn cards(&self) -> AppResult<Vec<CardRef>> {
        Ok(lock(&self.state)?.cards.clone())
    }
}

#[async_trait]
impl BillingCustomerPort for DummyCustomer {
    async fn ready_for_billing(&self) -> AppResult<bool> {
        Ok(lock(&self.state)?.customer_id.is_some())
    }

    async fn gateway_customer(&self) -> AppResult<Option<CustomerId>> {
        Ok(lock(&self.state)?.customer_id.clone())
    }

    async fn provision(
        &self,
        card_token: Option<&str>,
        _properties: &SubscriptionProperties,
    ) -> AppResult<ProvisionedCustomer> {
        if let Some(token) = card_token {
            check_card_token(token)?;
        }

        let mut state = lock(&self.state)?;
        let customer_id = state
            .customer_id
            .get_or_insert_with(|| CustomerId::new(format!("dummy_cus_{}", Uuid::new_v4())))
            .clone();
        if card_token.is_some() {
            state.cards.push(new_card());
        }

        tracing::debug!(customer_id = %customer_id, "Dummy: Provisioned customer");
        Ok(ProvisionedCustomer {
            customer_id,
            cards: state.cards.clone(),
        })
    }

    async fn create_card(&self, card_token: &str) -> AppResult<CardRef> {
        check_card_token(card_token)?;

        let mut state = lock(&self.state)?;
        if state.customer_id.is_none() {
            return Err(AppError::Gateway(
                "Customer must be provisioned before adding a card".into(),
            ));
        }
        let card = new_card();
        state.cards.push(card.clone());
        Ok(card)
    }
}
