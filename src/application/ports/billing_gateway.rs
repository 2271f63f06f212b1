use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{app_error::AppResult, domain::entities::subscriber::Discount};

// ============================================================================
// Port Types - Gateway-agnostic domain types
// ============================================================================

/// Unique identifier for a customer in the billing gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription in the billing gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a stored card in the billing gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(pub String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CardId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A card stored on a gateway customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub id: CardId,
    pub brand: Option<String>,
    pub last4: Option<String>,
}

impl From<CardRef> for CardId {
    fn from(card: CardRef) -> Self {
        card.id
    }
}

impl From<&CardRef> for CardId {
    fn from(card: &CardRef) -> Self {
        card.id.clone()
    }
}

/// Snapshot of a remote subscription as reported by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub plan: Option<String>,
    /// Amount per interval in minor currency units
    pub amount: Option<i64>,
    pub interval: Option<String>,
    pub quantity: u32,
    pub card: Option<CardId>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// False once the subscription is canceled (immediately or pending period end)
    pub active: bool,
    pub period_started_at: Option<DateTime<Utc>>,
    pub period_ends_at: Option<DateTime<Utc>>,
    pub discounts: Option<Vec<Discount>>,
}

/// Properties sent with subscription create/update calls.
///
/// Unset fields are left for the gateway to decide; `extra` carries caller-supplied
/// gateway-specific properties verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionProperties {
    pub plan: Option<String>,
    pub quantity: Option<u32>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub coupon: Option<String>,
    pub card_token: Option<String>,
    pub card: Option<CardId>,
    pub prorate: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SubscriptionProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Move extras that collide with a typed field out of `extra`.
    ///
    /// `plan`, `quantity` and `prorate` fill their typed field when it is unset and the value
    /// parses; every other colliding extra is dropped. Afterwards each key serializes once.
    pub fn absorb_reserved_extras(&mut self) {
        for key in RESERVED_PROPERTY_KEYS {
            let Some(value) = self.extra.remove(*key) else {
                continue;
            };
            match *key {
                "plan" if self.plan.is_none() => self.plan = serde_json::from_value(value).ok(),
                "quantity" if self.quantity.is_none() => {
                    self.quantity = serde_json::from_value(value).ok()
                }
                "prorate" if self.prorate.is_none() => {
                    self.prorate = serde_json::from_value(value).ok()
                }
                _ => {}
            }
        }
    }
}

const RESERVED_PROPERTY_KEYS: &[&str] = &[
    "plan",
    "quantity",
    "trial_ends_at",
    "coupon",
    "card_token",
    "card",
    "prorate",
];

/// Outcome of provisioning a customer at the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedCustomer {
    pub customer_id: CustomerId,
    /// Cards stored on the customer after provisioning
    pub cards: Vec<CardRef>,
}

// ============================================================================
// Port Traits
// ============================================================================

/// Subscription operations of the billing gateway.
///
/// Implementations translate these calls into the gateway's API. Every call may fail with
/// a transport or gateway error.
#[async_trait]
pub trait SubscriptionGatewayPort: Send + Sync {
    /// Create a subscription for `plan`, optionally attached to an existing customer.
    async fn create_subscription(
        &self,
        customer: Option<&CustomerId>,
        plan: &str,
        properties: &SubscriptionProperties,
    ) -> AppResult<SubscriptionId>;

    async fn update_subscription(
        &self,
        subscription_id: &SubscriptionId,
        properties: &SubscriptionProperties,
    ) -> AppResult<()>;

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<()>;

    /// Fetch the current state of a subscription.
    ///
    /// # Return Value
    /// - `Some(info)` - Subscription found at the gateway
    /// - `None` - The gateway has no record of the subscription
    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Option<SubscriptionInfo>>;
}

/// The billing side of the customer entity that owns a subscriber.
#[async_trait]
pub trait BillingCustomerPort: Send + Sync {
    /// Whether the customer already exists at the gateway.
    async fn ready_for_billing(&self) -> AppResult<bool>;

    /// The customer's gateway reference, if provisioned.
    async fn gateway_customer(&self) -> AppResult<Option<CustomerId>>;

    /// Create the customer at the gateway, attaching a card from `card_token` when given.
    async fn provision(
        &self,
        card_token: Option<&str>,
        properties: &SubscriptionProperties,
    ) -> AppResult<ProvisionedCustomer>;

    /// Store a new card on the customer from a card token.
    async fn create_card(&self, card_token: &str) -> AppResult<CardRef>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn card_id_from_raw_or_object() {
        let raw: CardId = "card_1".into();
        let card = CardRef {
            id: CardId::new("card_2"),
            brand: Some("visa".into()),
            last4: Some("4242".into()),
        };
        let from_ref: CardId = (&card).into();
        let from_owned: CardId = card.into();

        assert_eq!(raw.as_str(), "card_1");
        assert_eq!(from_ref, CardId::new("card_2"));
        assert_eq!(from_owned, from_ref);
    }

    #[test]
    fn properties_serialize_extras_inline() {
        let props = SubscriptionProperties::new()
            .with_quantity(3)
            .with_extra("description", json!("team seats"));
        let value = serde_json::to_value(&props).unwrap();

        assert_eq!(value["quantity"], json!(3));
        assert_eq!(value["description"], json!("team seats"));
        assert!(value["coupon"].is_null());
    }

    #[test]
    fn colliding_extras_are_absorbed_once() {
        let mut props = SubscriptionProperties::new()
            .with_quantity(2)
            .with_extra("plan", json!("gold"))
            .with_extra("quantity", json!(9))
            .with_extra("coupon", json!("CALLER"))
            .with_extra("description", json!("kept"));

        props.absorb_reserved_extras();

        assert_eq!(props.plan.as_deref(), Some("gold"));
        assert_eq!(props.quantity, Some(2));
        assert_eq!(props.coupon, None);
        assert_eq!(props.extra.len(), 1);
        assert_eq!(props.extra["description"], json!("kept"));
    }

    #[test]
    fn ids_display_raw_value() {
        assert_eq!(SubscriptionId::new("sub_1").to_string(), "sub_1");
        assert_eq!(CustomerId::new("cus_1").to_string(), "cus_1");
    }
}
