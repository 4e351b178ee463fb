//! Cross-module tests for the role-binding engine.
//!
//! - **Scenario tests**: whole contexts driven through their triggers
//! - **Property tests**: cleanup and conservation over generated inputs
//! - **Helper functions**: test players and context factories
//!
//! # Test Structure
//!
//! - `scenarios.rs`: money transfer, cleanup, facade and wrapper dispatch
//! - `properties.rs`: proptest checks of the trigger lifecycle
//! - `helpers.rs`: `Account`/`Wallet` players and the transfer context

pub(crate) mod helpers;
mod scenarios;
