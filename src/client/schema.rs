//! Response schema for the account endpoints
//!
//! One declared field per concept. Where the exchange ships more than one
//! shape for the same resource, each shape is its own variant.

use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Standard response wrapper: `{"code": "200000", "data": ...}`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

/// Decode the `data` member of a successful envelope
pub fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_value(value)?;
    envelope
        .data
        .ok_or_else(|| EngineError::Transport(format!("response {} carried no data", envelope.code)))
}

/// `GET /api/v1/account-overview-all` on the derivatives host
#[derive(Debug, Clone, Deserialize)]
pub struct FuturesOverviewAll {
    #[serde(default)]
    pub accounts: Vec<FuturesAccountEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesAccountEntry {
    pub account_name: String,
    /// Withheld by the exchange when the key lacks sub-account scope
    #[serde(default)]
    pub account_equity: Option<Decimal>,
}

/// One currency line of `GET /api/v1/accounts` on the spot host
#[derive(Debug, Clone, Deserialize)]
pub struct SpotAccountEntry {
    pub currency: String,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    pub balance: Decimal,
}

/// Spot balances of every sub-account
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubAccountListing {
    /// `GET /api/v2/sub-accounts`: paginated
    V2(SubAccountPage),
    /// `GET /api/v1/sub-accounts`: bare array
    V1(Vec<SubAccountSpotBalances>),
}

impl SubAccountListing {
    pub fn items(&self) -> &[SubAccountSpotBalances] {
        match self {
            SubAccountListing::V2(page) => &page.items,
            SubAccountListing::V1(items) => items,
        }
    }

    /// Whether a further page exists after this one
    pub fn has_next_page(&self) -> bool {
        match self {
            SubAccountListing::V2(page) => page.current_page < page.total_page,
            SubAccountListing::V1(_) => false,
        }
    }

    pub fn into_items(self) -> Vec<SubAccountSpotBalances> {
        match self {
            SubAccountListing::V2(page) => page.items,
            SubAccountListing::V1(items) => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAccountPage {
    pub current_page: u32,
    pub total_page: u32,
    #[serde(default)]
    pub items: Vec<SubAccountSpotBalances>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAccountSpotBalances {
    pub sub_name: String,
    #[serde(default)]
    pub main_accounts: Vec<CurrencyBalance>,
    #[serde(default)]
    pub trade_accounts: Vec<CurrencyBalance>,
}

impl SubAccountSpotBalances {
    /// Sum of the balances whose currency passes `accept`, over main and trade accounts
    pub fn stable_total(&self, accept: impl Fn(&str) -> bool) -> Decimal {
        self.main_accounts
            .iter()
            .chain(self.trade_accounts.iter())
            .filter(|b| accept(&b.currency))
            .map(|b| b.balance)
            .sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyBalance {
    pub currency: String,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_decode_overview() {
        let raw = json!({
            "code": "200000",
            "data": {
                "summary": {"accountEquityTotal": 150.5, "currency": "USDT"},
                "accounts": [
                    {"accountName": "main", "accountEquity": 30.5, "currency": "USDT"},
                    {"accountName": "robot1", "accountEquity": 120, "currency": "USDT"},
                    {"accountName": "robot2", "currency": "USDT"}
                ]
            }
        });
        let overview: FuturesOverviewAll = decode(raw).unwrap();
        assert_eq!(overview.accounts.len(), 3);
        assert_eq!(overview.accounts[0].account_equity, Some(dec!(30.5)));
        assert_eq!(overview.accounts[1].account_equity, Some(dec!(120)));
        assert_eq!(overview.accounts[2].account_equity, None);
    }

    #[test]
    fn test_decode_spot_accounts_string_balances() {
        let raw = json!({
            "code": "200000",
            "data": [
                {"id": "a", "currency": "USDT", "type": "main", "balance": "12.34", "available": "12.34", "holds": "0"},
                {"id": "b", "currency": "BTC", "type": "trade", "balance": "0.5", "available": "0.5", "holds": "0"}
            ]
        });
        let entries: Vec<SpotAccountEntry> = decode(raw).unwrap();
        assert_eq!(entries[0].balance, dec!(12.34));
        assert_eq!(entries[1].account_type.as_deref(), Some("trade"));
    }

    #[test]
    fn test_sub_account_listing_v2() {
        let raw = json!({
            "code": "200000",
            "data": {
                "currentPage": 1, "pageSize": 100, "totalNum": 1, "totalPage": 2,
                "items": [{
                    "subUserId": "x", "subName": "robot1",
                    "mainAccounts": [{"currency": "USDT", "balance": "5"}],
                    "tradeAccounts": [{"currency": "USDC", "balance": "2.5"}, {"currency": "ETH", "balance": "1"}],
                    "marginAccounts": []
                }]
            }
        });
        let listing: SubAccountListing = decode(raw).unwrap();
        assert!(matches!(listing, SubAccountListing::V2(_)));
        assert!(listing.has_next_page());
        let total = listing.items()[0].stable_total(|c| c == "USDT" || c == "USDC");
        assert_eq!(total, dec!(7.5));
    }

    #[test]
    fn test_sub_account_listing_v1() {
        let raw = json!({
            "code": "200000",
            "data": [{"subUserId": "x", "subName": "robot9", "mainAccounts": [], "tradeAccounts": []}]
        });
        let listing: SubAccountListing = decode(raw).unwrap();
        assert!(matches!(listing, SubAccountListing::V1(_)));
        assert!(!listing.has_next_page());
        assert_eq!(listing.into_items()[0].sub_name, "robot9");
    }

    #[test]
    fn test_missing_data_is_transport() {
        let raw = json!({"code": "200000"});
        let result: Result<FuturesOverviewAll> = decode(raw);
        assert!(matches!(result, Err(EngineError::Transport(_))));
    }
}
