pub mod remote_subscription;
pub mod subscription_manager;
pub mod subscriptions;
