//! Account aggregation
//!
//! One refresh reads three things concurrently: the derivatives overview of
//! every sub-account (a single call, which carries each account's equity),
//! the master account's spot lines, and the spot balances of all
//! sub-accounts. Only the overview is mandatory; the other two degrade to
//! zero when they fail.

use crate::client::schema::{decode, FuturesAccountEntry, FuturesOverviewAll, SpotAccountEntry, SubAccountListing};
use crate::client::ExchangeApi;
use crate::config::ExchangeConfig;
use crate::error::{EngineError, Result};
use crate::types::{AccountSnapshot, AggregationReport, Credential, SubAccountBalance, Venue};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};


pub const SPOT_ACCOUNTS_PATH: &str = "/api/v1/accounts";

const SUB_ACCOUNTS_PAGE_SIZE: u32 = 100;

pub fn overview_path(currency: &str) -> String {
    format!("/api/v1/account-overview-all?currency={}", currency)
}

pub fn sub_accounts_path(page: u32) -> String {
    format!(
        "/api/v2/sub-accounts?currentPage={}&pageSize={}",
        page, SUB_ACCOUNTS_PAGE_SIZE
    )
}

/// Overview entries split into the master account and the bot sub-accounts
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedAccounts {
    pub master_derivatives: Decimal,
    /// `(name, equity)`; `None` when the exchange withheld the balance
    pub bots: Vec<(String, Option<Decimal>)>,
}

/// Split overview entries by naming convention. Entries that are neither the
/// main account nor a bot are ignored.
pub fn classify_accounts(entries: &[FuturesAccountEntry], main_name: &str, bot_prefix: &str) -> ClassifiedAccounts {
    let mut master_derivatives = Decimal::ZERO;
    let mut bots = Vec::new();

    for entry in entries {
        if entry.account_name == main_name {
            master_derivatives += entry.account_equity.unwrap_or(Decimal::ZERO);
        } else if entry.account_name.starts_with(bot_prefix) {
            bots.push((entry.account_name.clone(), entry.account_equity));
        }
    }

    ClassifiedAccounts {
        master_derivatives,
        bots,
    }
}

/// Spot balances of the sub-accounts, or why they could not be read
enum SubSpot {
    Read(HashMap<String, Decimal>),
    Denied,
    Unavailable,
}

pub struct AccountAggregator {
    exchange: Arc<dyn ExchangeApi>,
    config: ExchangeConfig,
}

impl AccountAggregator {
    pub fn new(exchange: Arc<dyn ExchangeApi>, config: ExchangeConfig) -> Self {
        Self { exchange, config }
    }

    /// Aggregate one account into a report. Bots are their own baseline here;
    /// use the orchestrator for profit tracking.
    pub async fn aggregate(&self, credential: &Credential, label: &str) -> AggregationReport {
        match self.collect(credential).await {
            Ok(snapshot) => AggregationReport::from_snapshot(label, &snapshot, &HashMap::new()),
            Err(e) => {
                error!(label, "Aggregation failed: {}", e);
                AggregationReport::failed(label, e.to_string())
            }
        }
    }

    /// Read and reconcile every balance of one account.
    ///
    /// Fails only when the credential is unusable or the derivatives overview
    /// cannot be read.
    pub async fn collect(&self, credential: &Credential) -> Result<AccountSnapshot> {
        credential.validate()?;

        let overview_path = overview_path(&self.config.overview_currency);
        // The two narrow reads never fail the join, so an overview error
        // returns at once instead of waiting on them.
        let (overview, master_spot, sub_spot) = tokio::try_join!(
            async {
                let raw = self.exchange.call(credential, Venue::Derivatives, &overview_path).await?;
                decode::<FuturesOverviewAll>(raw)
            },
            async { Ok::<_, EngineError>(self.master_spot_balance(credential).await) },
            async { Ok::<_, EngineError>(self.sub_account_spot(credential).await) },
        )?;

        let classified = classify_accounts(
            &overview.accounts,
            &self.config.main_account_name,
            &self.config.bot_prefix,
        );

        let master_spot_balance = master_spot.unwrap_or_else(|e| {
            warn!("{}", EngineError::PartialData(format!("master spot balance zero-filled: {}", e)));
            Decimal::ZERO
        });

        let bots = self.merge_bots(classified.bots, sub_spot);
        debug!(
            bots = bots.len(),
            "Collected {} master derivatives, {} master spot",
            classified.master_derivatives,
            master_spot_balance
        );

        Ok(AccountSnapshot {
            master_spot_balance,
            master_derivatives_balance: classified.master_derivatives,
            bots,
        })
    }

    /// Combine derivatives equity and spot balances per bot. Bots that only
    /// appear in the spot listing are kept with zero derivatives.
    fn merge_bots(&self, overview_bots: Vec<(String, Option<Decimal>)>, sub_spot: SubSpot) -> Vec<SubAccountBalance> {
        let (spot, spot_denied, spot_missing) = match sub_spot {
            SubSpot::Read(map) => (map, false, false),
            SubSpot::Denied => (HashMap::new(), true, false),
            SubSpot::Unavailable => (HashMap::new(), false, true),
        };

        let mut seen = HashSet::new();
        let mut bots = Vec::with_capacity(overview_bots.len());

        for (name, equity) in overview_bots {
            let spot_amount = spot.get(&name).copied().unwrap_or(Decimal::ZERO);
            let mut balance = SubAccountBalance::new(name.clone(), spot_amount, equity.unwrap_or(Decimal::ZERO));
            if equity.is_none() || spot_denied {
                balance = balance.denied();
            } else if spot_missing {
                balance = balance.partial();
            }
            seen.insert(name);
            bots.push(balance);
        }

        let mut spot_only: Vec<(&String, &Decimal)> = spot
            .iter()
            .filter(|(name, _)| name.starts_with(&self.config.bot_prefix) && !seen.contains(*name))
            .collect();
        spot_only.sort_by(|a, b| a.0.cmp(b.0));
        bots.extend(
            spot_only
                .into_iter()
                .map(|(name, amount)| SubAccountBalance::new(name.clone(), *amount, Decimal::ZERO)),
        );

        bots
    }

    /// Σ stable-currency balances over the master account's spot and main
    /// lines. Margin lines carry borrowed funds and are skipped.
    async fn master_spot_balance(&self, credential: &Credential) -> Result<Decimal> {
        let raw = self.exchange.call(credential, Venue::Spot, SPOT_ACCOUNTS_PATH).await?;
        let entries: Vec<SpotAccountEntry> = decode(raw)?;

        Ok(entries
            .iter()
            .filter(|e| {
                e.account_type
                    .as_deref()
                    .is_some_and(|t| self.config.is_spot_account_type(t))
            })
            .filter(|e| self.config.is_stable_currency(&e.currency))
            .map(|e| e.balance)
            .sum())
    }

    async fn sub_account_spot(&self, credential: &Credential) -> SubSpot {
        match self.fetch_sub_account_pages(credential).await {
            Ok(map) => SubSpot::Read(map),
            Err(EngineError::Permission(msg)) => {
                warn!("Sub-account balances withheld: {}", msg);
                SubSpot::Denied
            }
            Err(e) => {
                warn!("{}", EngineError::PartialData(format!("sub-account spot balances zero-filled: {}", e)));
                SubSpot::Unavailable
            }
        }
    }

    async fn fetch_sub_account_pages(&self, credential: &Credential) -> Result<HashMap<String, Decimal>> {
        let mut balances = HashMap::new();
        let mut page = 1;

        loop {
            let raw = self
                .exchange
                .call(credential, Venue::Spot, &sub_accounts_path(page))
                .await?;
            let listing: SubAccountListing = decode(raw)?;
            let has_next = listing.has_next_page();

            for item in listing.into_items() {
                let total = item.stable_total(|c| self.config.is_stable_currency(c));
                balances.insert(item.sub_name, total);
            }

            if !has_next {
                break;
            }
            if page >= self.config.max_sub_account_pages {
                warn!(
                    max_pages = self.config.max_sub_account_pages,
                    "Sub-account listing capped at {} pages, later sub-accounts read as zero spot",
                    self.config.max_sub_account_pages
                );
                break;
            }
            page += 1;
        }

        Ok(balances)
    }
}
