//! Bot P&L Engine
//!
//! Aggregates the balances of an exchange master account and its bot
//! sub-accounts, and tracks each bot's profit against a persisted baseline.
//!
//! ## Architecture
//!
//! ```text
//! HTTP / CLI → RetryOrchestrator ──→ AccountAggregator → ExchangeClient (signed REST)
//!                     │
//!                     └──→ BaselineStore (SQLite: baselines, balance history)
//! ```

pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod storage;
pub mod testing;
pub mod types;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod integration_tests;
