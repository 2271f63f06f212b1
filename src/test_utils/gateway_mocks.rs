//! Recording doubles for the gateway-facing ports.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::{
        BillingCustomerPort, CardId, CardRef, CustomerId, ProvisionedCustomer,
        SubscriptionGatewayPort, SubscriptionId, SubscriptionInfo, SubscriptionProperties,
    },
};

// ============================================================================
// RecordingGateway
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Create {
        customer: Option<CustomerId>,
        plan: String,
        properties: SubscriptionProperties,
    },
    Update {
        id: SubscriptionId,
        properties: SubscriptionProperties,
    },
    Cancel {
        id: SubscriptionId,
        at_period_end: bool,
    },
    Get {
        id: SubscriptionId,
    },
}

/// One-shot answer for the next `get_subscription` call.
#[derive(Debug, Clone)]
pub enum InfoResponse {
    Found(SubscriptionInfo),
    Empty,
    Fail(String),
}

/// Gateway double that records every call.
///
/// Lookups answer from the queued responses first, then from the configured snapshot,
/// regardless of the requested id. Created subscriptions get ids `sub_created_<n>`.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    info: Mutex<Option<SubscriptionInfo>>,
    info_error: Mutex<Option<String>>,
    queued: Mutex<VecDeque<InfoResponse>>,
    mutation_error: Mutex<Option<String>>,
    created: Mutex<u32>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_info(&self, info: SubscriptionInfo) {
        *self.info.lock().unwrap() = Some(info);
    }

    pub fn clear_info(&self) {
        *self.info.lock().unwrap() = None;
    }

    /// Fail every following lookup that has no queued response.
    pub fn fail_info(&self, message: &str) {
        *self.info_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn push_info(&self, response: InfoResponse) {
        self.queued.lock().unwrap().push_back(response);
    }

    /// Fail every following create, update and cancel.
    pub fn fail_mutations(&self, message: &str) {
        *self.mutation_error.lock().unwrap() = Some(message.to_string());
    }

    fn record(&self, call: GatewayCall) -> AppResult<()> {
        let is_lookup = matches!(call, GatewayCall::Get { .. });
        self.calls.lock().unwrap().push(call);
        if is_lookup {
            return Ok(());
        }
        match self.mutation_error.lock().unwrap().as_ref() {
            Some(message) => Err(AppError::Gateway(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SubscriptionGatewayPort for RecordingGateway {
    async fn create_subscription(
        &self,
        customer: Option<&CustomerId>,
        plan: &str,
        properties: &SubscriptionProperties,
    ) -> AppResult<SubscriptionId> {
        self.record(GatewayCall::Create {
            customer: customer.cloned(),
            plan: plan.to_string(),
            properties: properties.clone(),
        })?;
        let mut created = self.created.lock().unwrap();
        *created += 1;
        Ok(SubscriptionId::new(format!("sub_created_{}", *created)))
    }

    async fn update_subscription(
        &self,
        subscription_id: &SubscriptionId,
        properties: &SubscriptionProperties,
    ) -> AppResult<()> {
        self.record(GatewayCall::Update {
            id: subscription_id.clone(),
            properties: properties.clone(),
        })
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<()> {
        self.record(GatewayCall::Cancel {
            id: subscription_id.clone(),
            at_period_end,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Option<SubscriptionInfo>> {
        self.record(GatewayCall::Get {
            id: subscription_id.clone(),
        })?;

        if let Some(response) = self.queued.lock().unwrap().pop_front() {
            return match response {
                InfoResponse::Found(info) => Ok(Some(info)),
                InfoResponse::Empty => Ok(None),
                InfoResponse::Fail(message) => Err(AppError::Gateway(message)),
            };
        }
        if let Some(message) = self.info_error.lock().unwrap().as_ref() {
            return Err(AppError::Gateway(message.clone()));
        }
        Ok(self.info.lock().unwrap().clone())
    }
}

// ============================================================================
// MockCustomer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerCall {
    Provision { card_token: Option<String> },
    CreateCard { token: String },
}

/// Customer double. Only provisioning and card creation are recorded.
///
/// Cards created from a token get the id `card_from_<token>`.
pub struct MockCustomer {
    customer_id: CustomerId,
    ready: Mutex<bool>,
    stores_cards: bool,
    fail_cards: bool,
    calls: Mutex<Vec<CustomerCall>>,
}

impl MockCustomer {
    /// A customer that already exists at the gateway.
    pub fn ready(customer_id: &str) -> Self {
        Self {
            customer_id: CustomerId::new(customer_id),
            ready: Mutex::new(true),
            stores_cards: true,
            fail_cards: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A customer that gets `customer_id` once provisioned.
    pub fn unprovisioned(customer_id: &str) -> Self {
        Self {
            ready: Mutex::new(false),
            ..Self::ready(customer_id)
        }
    }

    /// Provisioning succeeds but leaves no card on the customer.
    pub fn without_stored_cards(mut self) -> Self {
        self.stores_cards = false;
        self
    }

    /// Card creation is declined.
    pub fn failing_cards(mut self) -> Self {
        self.fail_cards = true;
        self
    }

    pub fn calls(&self) -> Vec<CustomerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn card_for(token: &str) -> CardRef {
        CardRef {
            id: CardId::new(format!("card_from_{}", token)),
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
        }
    }
}

#[async_trait]
impl BillingCustomerPort for MockCustomer {
    async fn ready_for_billing(&self) -> AppResult<bool> {
        Ok(*self.ready.lock().unwrap())
    }

    async fn gateway_customer(&self) -> AppResult<Option<CustomerId>> {
        if *self.ready.lock().unwrap() {
            Ok(Some(self.customer_id.clone()))
        } else {
            Ok(None)
        }
    }

    async fn provision(
        &self,
        card_token: Option<&str>,
        _properties: &SubscriptionProperties,
    ) -> AppResult<ProvisionedCustomer> {
        self.calls.lock().unwrap().push(CustomerCall::Provision {
            card_token: card_token.map(str::to_string),
        });
        *self.ready.lock().unwrap() = true;

        let cards = match card_token {
            Some(token) if self.stores_cards => vec![Self::card_for(token)],
            _ => Vec::new(),
        };
        Ok(ProvisionedCustomer {
            customer_id: self.customer_id.clone(),
            cards,
        })
    }

    async fn create_card(&self, card_token: &str) -> AppResult<CardRef> {
        self.calls.lock().unwrap().push(CustomerCall::CreateCard {
            token: card_token.to_string(),
        });
        if self.fail_cards {
            return Err(AppError::PaymentDeclined(
                "Your card was declined.".to_string(),
            ));
        }
        Ok(Self::card_for(card_token))
    }
}
