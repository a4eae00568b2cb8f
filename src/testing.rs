//! Scripted exchange fixture for deterministic tests

use crate::client::ExchangeApi;
use crate::error::{EngineError, Result};
use crate::types::{Credential, Venue};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Canned outcome for one endpoint
#[derive(Debug, Clone)]
pub enum FixtureResponse {
    Ok(Value),
    Transport(String),
    /// Exchange error payload with the given code and message
    Code(String, String),
}

impl FixtureResponse {
    fn into_result(self) -> Result<Value> {
        match self {
            FixtureResponse::Ok(v) => Ok(v),
            FixtureResponse::Transport(msg) => Err(EngineError::Transport(msg)),
            FixtureResponse::Code(code, msg) => Err(EngineError::from_exchange_code(&code, msg)),
        }
    }
}

#[derive(Default)]
struct Route {
    /// Consumed first, one per call
    scripted: VecDeque<FixtureResponse>,
    /// Returned once the script is exhausted
    steady: Option<FixtureResponse>,
}

/// In-memory [`ExchangeApi`] keyed by `(venue, path)`
#[derive(Default)]
pub struct FixtureExchange {
    routes: Mutex<HashMap<(Venue, String), Route>>,
    calls: Mutex<Vec<(Venue, String)>>,
    delay: Option<Duration>,
    route_delays: HashMap<(Venue, String), Duration>,
}

impl FixtureExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls to `path` sleep this long before answering
    pub fn slow(mut self, venue: Venue, path: &str, delay: Duration) -> Self {
        self.route_delays.insert((venue, path.to_string()), delay);
        self
    }

    /// Always answer `path` with `response`
    pub fn route(self, venue: Venue, path: &str, response: FixtureResponse) -> Self {
        self.routes
            .lock()
            .entry((venue, path.to_string()))
            .or_default()
            .steady = Some(response);
        self
    }

    /// Answer the next call to `path` with `response`, before the steady answer
    pub fn then(self, venue: Venue, path: &str, response: FixtureResponse) -> Self {
        self.routes
            .lock()
            .entry((venue, path.to_string()))
            .or_default()
            .scripted
            .push_back(response);
        self
    }

    pub fn call_count(&self, venue: Venue, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(v, p)| *v == venue && p == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExchangeApi for FixtureExchange {
    async fn call(&self, _credential: &Credential, venue: Venue, path: &str) -> Result<Value> {
        self.calls.lock().push((venue, path.to_string()));

        let delay = self
            .route_delays
            .get(&(venue, path.to_string()))
            .copied()
            .or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = {
            let mut routes = self.routes.lock();
            routes.get_mut(&(venue, path.to_string())).and_then(|route| {
                route.scripted.pop_front().or_else(|| route.steady.clone())
            })
        };

        response
            .unwrap_or_else(|| FixtureResponse::Code("404000".into(), format!("no fixture for {}", path)))
            .into_result()
    }
}

/// `{"code": "200000", "data": data}`
pub fn ok(data: Value) -> FixtureResponse {
    FixtureResponse::Ok(json!({ "code": "200000", "data": data }))
}

/// Derivatives overview with `(accountName, accountEquity)` entries; `None` withholds equity
pub fn overview(accounts: &[(&str, Option<&str>)]) -> FixtureResponse {
    let accounts: Vec<Value> = accounts
        .iter()
        .map(|(name, equity)| match equity {
            Some(eq) => json!({ "accountName": name, "accountEquity": eq, "currency": "USDT" }),
            None => json!({ "accountName": name, "currency": "USDT" }),
        })
        .collect();
    ok(json!({ "summary": { "currency": "USDT" }, "accounts": accounts }))
}

/// Master spot/main account lines as `(currency, type, balance)`
pub fn spot_accounts(lines: &[(&str, &str, &str)]) -> FixtureResponse {
    let data: Vec<Value> = lines
        .iter()
        .map(|(currency, kind, balance)| {
            json!({ "id": format!("{}-{}", currency, kind), "currency": currency, "type": kind,
                    "balance": balance, "available": balance, "holds": "0" })
        })
        .collect();
    ok(Value::Array(data))
}

/// Single-page sub-account listing with `(subName, USDT main balance)` items
pub fn sub_accounts(items: &[(&str, &str)]) -> FixtureResponse {
    let items: Vec<Value> = items
        .iter()
        .map(|(name, usdt)| {
            json!({ "subUserId": format!("id-{}", name), "subName": name,
                    "mainAccounts": [{ "currency": "USDT", "balance": usdt }],
                    "tradeAccounts": [], "marginAccounts": [] })
        })
        .collect();
    ok(json!({ "currentPage": 1, "pageSize": 100, "totalNum": items.len(), "totalPage": 1, "items": items }))
}
