//! Subscriber billing columns in the `subscribers` table.
//!
//! ```sql
//! CREATE TABLE subscribers (
//!     id UUID PRIMARY KEY,
//!     billing_active BOOLEAN NOT NULL DEFAULT FALSE,
//!     billing_subscription TEXT,
//!     billing_plan TEXT,
//!     billing_amount BIGINT NOT NULL DEFAULT 0,
//!     billing_interval TEXT,
//!     billing_quantity INTEGER NOT NULL DEFAULT 0 CHECK (billing_quantity >= 0),
//!     billing_card TEXT,
//!     billing_trial_ends_at TIMESTAMPTZ,
//!     billing_subscription_ends_at TIMESTAMPTZ,
//!     billing_discounts JSONB,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use async_trait::async_trait;
use sqlx::{Row, types::Json};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::subscription_manager::SubscriberRepo,
    domain::entities::subscriber::{BillingFields, Discount, SubscriberProfile},
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> SubscriberProfile {
    let id: Uuid = row.get("id");
    let discounts_json: Option<serde_json::Value> = row.get("billing_discounts");
    let discounts: Option<Vec<Discount>> = parse_json_with_fallback(
        &discounts_json.unwrap_or(serde_json::Value::Null),
        "billing_discounts",
        "subscriber",
        &id.to_string(),
    );

    SubscriberProfile {
        id,
        billing: BillingFields {
            active: row.get("billing_active"),
            subscription: row.get("billing_subscription"),
            plan: row.get("billing_plan"),
            amount: row.get("billing_amount"),
            interval: row.get("billing_interval"),
            quantity: quantity_from_db(row.get("billing_quantity")),
            card: row.get("billing_card"),
            trial_ends_at: row.get("billing_trial_ends_at"),
            subscription_ends_at: row.get("billing_subscription_ends_at"),
            discounts,
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn quantity_from_db(quantity: i32) -> u32 {
    u32::try_from(quantity).unwrap_or(0)
}

fn quantity_to_db(quantity: u32) -> AppResult<i32> {
    i32::try_from(quantity).map_err(|_| {
        AppError::InvalidInput(format!(
            "Billing quantity {} exceeds the storable maximum of {}",
            quantity,
            i32::MAX
        ))
    })
}

const SELECT_COLS: &str = r#"
    id, billing_active, billing_subscription, billing_plan, billing_amount,
    billing_interval, billing_quantity, billing_card, billing_trial_ends_at,
    billing_subscription_ends_at, billing_discounts, created_at, updated_at
"#;

#[async_trait]
impl SubscriberRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriberProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscribers WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn save(&self, subscriber: &SubscriberProfile) -> AppResult<()> {
        let billing = &subscriber.billing;
        let quantity = quantity_to_db(billing.quantity).inspect_err(|err| {
            tracing::warn!(
                subscriber_id = %subscriber.id,
                error = %err,
                "Refusing to save subscriber"
            );
        })?;
        sqlx::query(
            r#"
            INSERT INTO subscribers (
                id, billing_active, billing_subscription, billing_plan, billing_amount,
                billing_interval, billing_quantity, billing_card, billing_trial_ends_at,
                billing_subscription_ends_at, billing_discounts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                billing_active = EXCLUDED.billing_active,
                billing_subscription = EXCLUDED.billing_subscription,
                billing_plan = EXCLUDED.billing_plan,
                billing_amount = EXCLUDED.billing_amount,
                billing_interval = EXCLUDED.billing_interval,
                billing_quantity = EXCLUDED.billing_quantity,
                billing_card = EXCLUDED.billing_card,
                billing_trial_ends_at = EXCLUDED.billing_trial_ends_at,
                billing_subscription_ends_at = EXCLUDED.billing_subscription_ends_at,
                billing_discounts = EXCLUDED.billing_discounts,
                updated_at = NOW()
            "#,
        )
        .bind(subscriber.id)
        .bind(billing.active)
        .bind(&billing.subscription)
        .bind(&billing.plan)
        .bind(billing.amount)
        .bind(&billing.interval)
        .bind(quantity)
        .bind(&billing.card)
        .bind(billing.trial_ends_at)
        .bind(billing.subscription_ends_at)
        .bind(billing.discounts.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        tracing::debug!(subscriber_id = %subscriber.id, "Saved subscriber billing state");
        Ok(())
    }

    async fn list_with_subscription(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<SubscriberProfile>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM subscribers
               WHERE billing_subscription IS NOT NULL AND ($1::uuid IS NULL OR id > $1)
               ORDER BY id
               LIMIT $2"#,
            SELECT_COLS
        ))
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_profile).collect())
    }
}
