//! End-to-end tests: config → aggregator → store → HTTP

#[cfg(test)]
mod tests {
    use crate::aggregator::{overview_path, sub_accounts_path, AccountAggregator, SPOT_ACCOUNTS_PATH};
    use crate::config::Config;
    use crate::orchestrator::RetryOrchestrator;
    use crate::server::{create_router, AppState};
    use crate::storage::BaselineStore;
    use crate::testing::{overview, spot_accounts, sub_accounts, FixtureExchange};
    use crate::types::{Credential, Diagnosis, Venue};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
        [exchange]
        bot_prefix = "grid"
        main_account_name = "master"
        overview_currency = "USDC"

        [retry]
        backoff_step_ms = 5
    "#;

    fn config() -> Config {
        toml::from_str(CONFIG).unwrap()
    }

    /// First overview read shows grid1 at 100, every later one at 110
    fn exchange() -> Arc<FixtureExchange> {
        let path = overview_path("USDC");
        Arc::new(
            FixtureExchange::new()
                .then(
                    Venue::Derivatives,
                    &path,
                    overview(&[("master", Some("500")), ("grid1", Some("100")), ("robot1", Some("999"))]),
                )
                .route(
                    Venue::Derivatives,
                    &path,
                    overview(&[("master", Some("500")), ("grid1", Some("110")), ("robot1", Some("999"))]),
                )
                .route(Venue::Spot, SPOT_ACCOUNTS_PATH, spot_accounts(&[("USDT", "main", "20"), ("BTC", "main", "1")]))
                .route(Venue::Spot, &sub_accounts_path(1), sub_accounts(&[])),
        )
    }

    async fn orchestrator(config: &Config, store: BaselineStore) -> RetryOrchestrator {
        let aggregator = Arc::new(AccountAggregator::new(exchange(), config.exchange.clone()));
        RetryOrchestrator::new(aggregator, store, config.retry.clone())
    }

    fn refresh_request() -> Request<Body> {
        let body = json!({ "apiKey": "k", "apiSecret": "s", "apiPassphrase": "p", "accountLabel": "Desk" });
        Request::builder()
            .method(Method::POST)
            .uri("/api/aggregate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(request: Request<Body>, router: axum::Router) -> Value {
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_profit_tracked_across_refreshes() {
        let config = config();
        let store = BaselineStore::in_memory().await.unwrap();
        let router = create_router(AppState::new(orchestrator(&config, store.clone()).await));

        let first = json_body(refresh_request(), router.clone()).await;
        assert_eq!(first["subCount"], 1);
        assert_eq!(first["bots"][0]["name"], "grid1");
        assert_eq!(first["masterBalance"], "520");
        assert_eq!(first["totalProfit"], "0");

        let second = json_body(refresh_request(), router).await;
        assert_eq!(second["bots"][0]["baseline"], "100");
        assert_eq!(second["bots"][0]["profit"], "10");
        assert_eq!(second["bots"][0]["profitPct"], "10");
        assert_eq!(second["totalBalance"], "630");

        let history = store.history("Desk", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].total_balance, dec!(630));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_baseline() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::connect(dir.path().join("pnl.db")).await.unwrap();

        let a = orchestrator(&config, store.clone()).await;
        let b = orchestrator(&config, store.clone()).await;
        let cred = Credential::new("k", "s", "p");

        let (ra, rb) = tokio::join!(a.run("Desk", &cred), b.run("Desk", &cred));
        assert_eq!(ra.diagnosis, Diagnosis::Ok);
        assert_eq!(rb.diagnosis, Diagnosis::Ok);
        // Both readers see the single stored row
        assert_eq!(ra.bots[0].baseline, rb.bots[0].baseline);

        let stored = store.list("Desk").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].baseline_balance, dec!(100));
    }

    #[tokio::test]
    async fn test_credentials_never_reach_the_store() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pnl.db");
        let store = BaselineStore::connect(&path).await.unwrap();
        let orch = orchestrator(&config, store).await;

        let cred = Credential::new("key-abc123", "secret-xyz789", "phrase-qrs456");
        orch.run("Desk", &cred).await;
        drop(orch);

        let mut raw = std::fs::read(&path).unwrap();
        if let Ok(wal) = std::fs::read(dir.path().join("pnl.db-wal")) {
            raw.extend(wal);
        }
        let raw = String::from_utf8_lossy(&raw);
        for secret in ["key-abc123", "secret-xyz789", "phrase-qrs456"] {
            assert!(!raw.contains(secret));
        }
        assert!(!format!("{:?}", cred).contains("secret-xyz789"));
    }
}
