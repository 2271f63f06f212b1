pub mod config;
pub mod dummy_gateway;
pub mod setup;
