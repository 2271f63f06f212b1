//! Test utilities for subscription lifecycle tests.
//!
//! This module provides:
//! - Test data factories for subscribers and gateway snapshots
//! - A recording gateway and mock customer for asserting on outbound calls
//! - An in-memory subscriber repository

mod factories;
mod gateway_mocks;
mod subscriber_mocks;

pub use factories::*;
pub use gateway_mocks::*;
pub use subscriber_mocks::*;
