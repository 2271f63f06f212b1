//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    application::ports::billing_gateway::{CardId, SubscriptionId, SubscriptionInfo},
    domain::entities::subscriber::{BillingFields, SubscriberProfile},
};

/// Create a subscriber that has never been billed.
pub fn create_test_subscriber(overrides: impl FnOnce(&mut SubscriberProfile)) -> SubscriberProfile {
    let mut subscriber = SubscriberProfile {
        id: Uuid::new_v4(),
        billing: BillingFields::cleared(),
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut subscriber);
    subscriber
}

/// Create a subscriber with an active subscription on the "pro" plan.
pub fn create_active_subscriber(
    subscription_id: &str,
    overrides: impl FnOnce(&mut SubscriberProfile),
) -> SubscriberProfile {
    create_test_subscriber(|s| {
        s.billing = BillingFields {
            active: true,
            subscription: Some(subscription_id.to_string()),
            plan: Some("pro".to_string()),
            amount: 1500,
            interval: Some("month".to_string()),
            quantity: 1,
            card: Some("card_1".to_string()),
            ..Default::default()
        };
        overrides(s);
    })
}

/// Create an active gateway snapshot for the "pro" plan.
pub fn create_test_info(
    subscription_id: &str,
    overrides: impl FnOnce(&mut SubscriptionInfo),
) -> SubscriptionInfo {
    let started = Utc::now() - Duration::days(3);
    let mut info = SubscriptionInfo {
        id: SubscriptionId::new(subscription_id),
        plan: Some("pro".to_string()),
        amount: Some(1500),
        interval: Some("month".to_string()),
        quantity: 1,
        card: Some(CardId::new("card_1")),
        trial_ends_at: None,
        active: true,
        period_started_at: Some(started),
        period_ends_at: Some(started + Duration::days(30)),
        discounts: None,
    };
    overrides(&mut info);
    info
}

/// Fixed timestamp for record metadata.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
