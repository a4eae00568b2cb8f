//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_exchange_config_default() {
        let config = ExchangeConfig::default();
        assert_eq!(config.spot_url, "https://api.kucoin.com");
        assert_eq!(config.futures_url, "https://api-futures.kucoin.com");
        assert_eq!(config.request_timeout(), Duration::from_secs(12));
        assert_eq!(config.key_version, "3");
        assert_eq!(config.header_prefix, "KC-API");
        assert_eq!(config.bot_prefix, "robot");
        assert_eq!(config.main_account_name, "main");
        assert_eq!(config.stable_currencies, vec!["USDT", "USDC"]);
        assert_eq!(config.spot_account_types, vec!["main", "trade", "trade_hf"]);
        assert!(config.is_spot_account_type("TRADE"));
        assert!(!config.is_spot_account_type("margin"));
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.deadline(), Duration::from_secs(20));
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.database.path, "data/bot_pnl.db");
    }

    #[test]
    fn test_partial_exchange_section() {
        let toml_str = r#"
[exchange]
bot_prefix = "grid"
stable_currencies = ["USDT"]
request_timeout_secs = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.exchange.bot_prefix, "grid");
        assert_eq!(config.exchange.stable_currencies, vec!["USDT"]);
        assert_eq!(config.exchange.request_timeout(), Duration::from_secs(5));
        // untouched fields keep their defaults
        assert_eq!(config.exchange.main_account_name, "main");
    }

    #[test]
    fn test_stable_currency_match_ignores_case() {
        let config = ExchangeConfig::default();
        assert!(config.is_stable_currency("USDT"));
        assert!(config.is_stable_currency("usdc"));
        assert!(!config.is_stable_currency("BTC"));
    }

    #[test]
    fn test_resolved_path_expands_env() {
        std::env::set_var("BOTPNL_TEST_DATA_DIR", "/tmp/bot-pnl-data");
        let config = DatabaseConfig {
            path: "$BOTPNL_TEST_DATA_DIR/pnl.db".to_string(),
        };
        assert_eq!(
            config.resolved_path(),
            std::path::PathBuf::from("/tmp/bot-pnl-data/pnl.db")
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[retry]
deadline_secs = 30
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.retry.deadline_secs, 30);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_load_missing_file_is_defaults() {
        let config = Config::load("/nonexistent/bot_pnl.toml").unwrap();
        assert_eq!(config.exchange.bot_prefix, "robot");
    }
}
