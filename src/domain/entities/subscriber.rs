use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// A discount applied to a remote subscription (coupon redemption).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub coupon: String,
    /// Fixed amount off in minor currency units
    pub amount_off: Option<i64>,
    pub percent_off: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Billing columns carried by a subscriber record.
///
/// Every field except `active` is a projection of the gateway's subscription info and is
/// only ever written by the reconciliation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingFields {
    pub active: bool,
    pub subscription: Option<String>,
    pub plan: Option<String>,
    /// Amount per interval in minor currency units
    pub amount: i64,
    pub interval: Option<String>,
    pub quantity: u32,
    pub card: Option<String>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub discounts: Option<Vec<Discount>>,
}

impl BillingFields {
    /// Inactive defaults used when the gateway reports no subscription.
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_billing_active(&self) -> bool {
        self.active
    }

    /// A subscription counts as canceled once an end date has been recorded, whether that
    /// date is in the past (ended) or the future (grace period).
    pub fn is_canceled(&self) -> bool {
        self.subscription_ends_at.is_some()
    }

    pub fn on_trial(&self, now: DateTime<Utc>) -> bool {
        self.trial_ends_at.is_some_and(|ends| ends > now)
    }

    pub fn on_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.subscription_ends_at.is_some_and(|ends| ends > now)
    }

    /// Whether the subscriber currently has access to paid features.
    pub fn subscribed(&self, now: DateTime<Utc>) -> bool {
        self.is_billing_active() || self.on_trial(now) || self.on_grace_period(now)
    }

    pub fn ever_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn status(&self, now: DateTime<Utc>) -> SubscriberStatus {
        if self.active {
            if self.on_trial(now) {
                SubscriberStatus::Trialing
            } else {
                SubscriberStatus::Active
            }
        } else if self.on_grace_period(now) {
            SubscriberStatus::GracePeriod
        } else if self.is_canceled() {
            SubscriberStatus::Ended
        } else {
            SubscriberStatus::None
        }
    }
}

/// Coarse billing status derived from the stored billing columns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SubscriberStatus {
    Active,
    Trialing,
    /// Canceled but still paid up until the recorded end date
    GracePeriod,
    Ended,
    None,
}

impl SubscriberStatus {
    /// Returns true if the subscriber should have access to subscription features
    pub fn has_access(&self) -> bool {
        matches!(
            self,
            SubscriberStatus::Active | SubscriberStatus::Trialing | SubscriberStatus::GracePeriod
        )
    }
}

/// A locally persisted entity that can hold a billing subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberProfile {
    pub id: Uuid,
    pub billing: BillingFields,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriberProfile {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            billing: BillingFields::default(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_billing_active(&self) -> bool {
        self.billing.is_billing_active()
    }

    pub fn is_canceled(&self) -> bool {
        self.billing.is_canceled()
    }
}
