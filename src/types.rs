//! Core types shared by the engine, the store and the HTTP front door

use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// API key material for one logical account
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl Credential {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        api_passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_passphrase: api_passphrase.into(),
        }
    }

    fn fields(&self) -> [(&'static str, &str); 3] {
        [
            ("apiKey", self.api_key.as_str()),
            ("apiSecret", self.api_secret.as_str()),
            ("apiPassphrase", self.api_passphrase.as_str()),
        ]
    }

    /// Names of the blank fields
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .into_iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k)
            .collect()
    }

    /// Reject blank fields, and values that cannot travel in an HTTP header,
    /// before any exchange call is made
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(EngineError::InvalidCredentials(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let malformed: Vec<&str> = self
            .fields()
            .into_iter()
            .filter(|(_, v)| v.chars().any(|c| c.is_control() || !c.is_ascii()))
            .map(|(k, _)| k)
            .collect();
        if !malformed.is_empty() {
            return Err(EngineError::InvalidCredentials(format!(
                "{} contains control or non-ASCII characters",
                malformed.join(", ")
            )));
        }

        Ok(())
    }
}

// Secrets never reach logs, even through `{:?}`.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("api_passphrase", &"<redacted>")
            .finish()
    }
}

/// One of the two trading markets, each with its own host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Spot,
    Derivatives,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Spot => write!(f, "spot"),
            Venue::Derivatives => write!(f, "derivatives"),
        }
    }
}

/// Consolidated balance of one bot sub-account for a single refresh
#[derive(Debug, Clone, PartialEq)]
pub struct SubAccountBalance {
    pub name: String,
    pub venue_spot_amount: Decimal,
    pub venue_derivatives_amount: Decimal,
    pub total: Decimal,
    /// The exchange withheld at least one venue balance for lack of permission
    pub permission_denied: bool,
    /// At least one venue amount is a zero-fill, not a reading
    pub partial: bool,
}

impl SubAccountBalance {
    pub fn new(name: impl Into<String>, spot: Decimal, derivatives: Decimal) -> Self {
        Self {
            name: name.into(),
            venue_spot_amount: spot,
            venue_derivatives_amount: derivatives,
            total: spot + derivatives,
            permission_denied: false,
            partial: false,
        }
    }

    pub fn denied(mut self) -> Self {
        self.permission_denied = true;
        self.partial = true;
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

/// Classification of a completed or failed aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Diagnosis {
    Ok,
    MissingSubaccountPermission,
    ZeroBalance,
    Error,
}

/// Everything one aggregation pass read from the exchange, before baselines
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub master_spot_balance: Decimal,
    pub master_derivatives_balance: Decimal,
    pub bots: Vec<SubAccountBalance>,
}

impl AccountSnapshot {
    pub fn master_balance(&self) -> Decimal {
        self.master_spot_balance + self.master_derivatives_balance
    }

    pub fn sub_accounts_total(&self) -> Decimal {
        self.bots.iter().map(|b| b.total).sum()
    }

    pub fn grand_total(&self) -> Decimal {
        self.master_balance() + self.sub_accounts_total()
    }

    pub fn diagnosis(&self) -> Diagnosis {
        diagnose(self.grand_total(), &self.bots)
    }

    /// `(name, current total)` pairs used to seed baselines. Partial
    /// readings are left out: a zero-filled total must never become a
    /// permanent reference.
    pub fn observations(&self) -> Vec<Observation> {
        self.bots
            .iter()
            .filter(|b| !b.partial)
            .map(|b| Observation {
                name: b.name.clone(),
                current_total: b.total,
            })
            .collect()
    }
}

/// Pure diagnosis over a fetched account.
///
/// A permission-scoped read failure makes a zero total meaningless, so it is
/// reported ahead of `ZeroBalance`.
pub fn diagnose(grand_total: Decimal, bots: &[SubAccountBalance]) -> Diagnosis {
    if bots.iter().any(|b| b.permission_denied) {
        Diagnosis::MissingSubaccountPermission
    } else if grand_total.is_zero() {
        Diagnosis::ZeroBalance
    } else {
        Diagnosis::Ok
    }
}

/// A bot's current total as seen by one refresh
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub current_total: Decimal,
}

impl Observation {
    pub fn new(name: impl Into<String>, current_total: Decimal) -> Self {
        Self {
            name: name.into(),
            current_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSnapshot {
    pub id: String,
    pub name: String,
    pub spot_value: Decimal,
    pub derivatives_value: Decimal,
    pub current_value: Decimal,
    pub baseline: Decimal,
    pub profit: Decimal,
    pub profit_pct: Decimal,
}

impl BotSnapshot {
    /// Without a stored baseline the bot is its own reference and shows no profit
    pub fn new(balance: &SubAccountBalance, baseline: Option<Decimal>) -> Self {
        let current_value = balance.total;
        let baseline = baseline.unwrap_or(current_value);
        let profit = current_value - baseline;

        Self {
            id: balance.name.clone(),
            name: balance.name.clone(),
            spot_value: balance.venue_spot_amount,
            derivatives_value: balance.venue_derivatives_amount,
            current_value,
            baseline,
            profit,
            profit_pct: profit_pct(profit, baseline),
        }
    }
}

fn profit_pct(profit: Decimal, baseline: Decimal) -> Decimal {
    if baseline > Decimal::ZERO {
        (profit / baseline * Decimal::ONE_HUNDRED).round_dp(4).normalize()
    } else {
        Decimal::ZERO
    }
}

/// The engine's output for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub label: String,
    pub total_balance: Decimal,
    pub master_balance: Decimal,
    pub master_spot_balance: Decimal,
    pub master_derivatives_balance: Decimal,
    pub sub_accounts_total: Decimal,
    pub sub_count: usize,
    pub total_profit: Decimal,
    pub total_profit_pct: Decimal,
    pub bots: Vec<BotSnapshot>,
    pub diagnosis: Diagnosis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregationReport {
    /// Merge a snapshot with the baselines known for its bots
    pub fn from_snapshot(
        label: impl Into<String>,
        snapshot: &AccountSnapshot,
        baselines: &HashMap<String, Decimal>,
    ) -> Self {
        let bots: Vec<BotSnapshot> = snapshot
            .bots
            .iter()
            .map(|b| BotSnapshot::new(b, baselines.get(&b.name).copied()))
            .collect();

        let total_profit: Decimal = bots.iter().map(|b| b.profit).sum();
        let total_baseline: Decimal = bots.iter().map(|b| b.baseline).sum();

        Self {
            label: label.into(),
            total_balance: snapshot.grand_total(),
            master_balance: snapshot.master_balance(),
            master_spot_balance: snapshot.master_spot_balance,
            master_derivatives_balance: snapshot.master_derivatives_balance,
            sub_accounts_total: snapshot.sub_accounts_total(),
            sub_count: bots.len(),
            total_profit,
            total_profit_pct: profit_pct(total_profit, total_baseline),
            bots,
            diagnosis: snapshot.diagnosis(),
            error: None,
        }
    }

    /// Label-scoped failure report; the dashboard renders `error` as a banner
    pub fn failed(label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            total_balance: Decimal::ZERO,
            master_balance: Decimal::ZERO,
            master_spot_balance: Decimal::ZERO,
            master_derivatives_balance: Decimal::ZERO,
            sub_accounts_total: Decimal::ZERO,
            sub_count: 0,
            total_profit: Decimal::ZERO,
            total_profit_pct: Decimal::ZERO,
            bots: Vec::new(),
            diagnosis: Diagnosis::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One account to refresh in a multi-account request
#[derive(Debug, Clone)]
pub struct AccountRequest {
    pub label: String,
    pub credential: Credential,
}

/// Combined view over every configured account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_balance: Decimal,
    pub master_balance: Decimal,
    pub sub_accounts_total: Decimal,
    pub total_profit: Decimal,
    pub bot_count: usize,
    pub failed_accounts: usize,
    pub accounts: Vec<AggregationReport>,
}

impl PortfolioSummary {
    /// Failed accounts keep their slot in `accounts` but add nothing to the sums
    pub fn from_reports(accounts: Vec<AggregationReport>) -> Self {
        let ok = || accounts.iter().filter(|a| !a.is_error());

        Self {
            total_balance: ok().map(|a| a.total_balance).sum(),
            master_balance: ok().map(|a| a.master_balance).sum(),
            sub_accounts_total: ok().map(|a| a.sub_accounts_total).sum(),
            total_profit: ok().map(|a| a.total_profit).sum(),
            bot_count: ok().map(|a| a.bots.len()).sum(),
            failed_accounts: accounts.iter().filter(|a| a.is_error()).count(),
            accounts,
        }
    }
}
