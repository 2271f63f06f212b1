pub mod payment_scenario;
pub mod subscriber;
