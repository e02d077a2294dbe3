//! Integration test suite for vpn-orchestrator.
//!
//! These tests exercise the account lifecycle and transport selection
//! through the public API, with every external service replaced by an
//! in-memory fake.
//!
//! # Test Categories
//!
//! - `queue`: Task graph ordering, data flow and cancellation
//! - `lifecycle`: New, existing and unset account flows, failures and cancellation
//! - `transport`: Routing decisions for API requests
//!
//! # CI Compatibility
//!
//! No test touches the network, the filesystem outside temp directories,
//! or the real tunnel provider.

mod fixtures;

mod transport;
