//! Exchange API clients

pub mod auth;
pub mod exchange;
pub mod schema;

pub use auth::{AuthHeaders, RequestSigner};
pub use exchange::{ExchangeApi, ExchangeClient};
