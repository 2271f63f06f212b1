//! In-memory mock implementation of the subscriber repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::subscription_manager::SubscriberRepo,
    domain::entities::subscriber::SubscriberProfile,
};

// ============================================================================
// InMemorySubscriberRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriberRepo {
    pub subscribers: Mutex<HashMap<Uuid, SubscriberProfile>>,
    saves: Mutex<usize>,
    fail_saves: Mutex<bool>,
}

impl InMemorySubscriberRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subscribers: Vec<SubscriberProfile>) -> Self {
        let map: HashMap<Uuid, SubscriberProfile> =
            subscribers.into_iter().map(|s| (s.id, s)).collect();
        Self {
            subscribers: Mutex::new(map),
            ..Default::default()
        }
    }

    pub fn get(&self, id: Uuid) -> Option<SubscriberProfile> {
        self.subscribers.lock().unwrap().get(&id).cloned()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    /// Make every following save fail with a database error.
    pub fn fail_saves(&self) {
        *self.fail_saves.lock().unwrap() = true;
    }
}

#[async_trait]
impl SubscriberRepo for InMemorySubscriberRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriberProfile>> {
        Ok(self.get(id))
    }

    async fn save(&self, subscriber: &SubscriberProfile) -> AppResult<()> {
        if *self.fail_saves.lock().unwrap() {
            return Err(AppError::Database("save failed".into()));
        }
        self.subscribers
            .lock()
            .unwrap()
            .insert(subscriber.id, subscriber.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    async fn list_with_subscription(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<SubscriberProfile>> {
        let mut subscribers: Vec<SubscriberProfile> = self
            .subscribers
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.billing.subscription.is_some())
            .filter(|s| after.is_none_or(|after| s.id > after))
            .cloned()
            .collect();
        subscribers.sort_by_key(|s| s.id);
        subscribers.truncate(limit.max(0) as usize);
        Ok(subscribers)
    }
}
