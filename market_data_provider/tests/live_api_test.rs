//! Live API smoke tests. Ignored by default: they hit real endpoints and,
//! for Capital.com, need credentials in the environment or a `.env` file.
//!
//! Run with `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use serial_test::serial;

use market_data_provider::providers::{Provider, ProviderContext};
use market_data_provider::providers::capitalcom::CapitalComProvider;
use market_data_provider::providers::exchange::ExchangeProvider;
use market_data_provider::models::timeframe::Timeframe;

#[tokio::test]
#[serial]
#[ignore = "hits the live Binance API"]
async fn exchange_lists_spot_symbols() {
    dotenvy::dotenv().ok();
    let provider = ExchangeProvider::from_context(&ProviderContext {
        symbol: "BINANCE".to_string(),
        timeframe: Timeframe::Minutes(60),
        config_dir: None,
    })
    .unwrap();

    let symbols = provider.list_symbols().await.unwrap();
    assert!(symbols.iter().any(|s| s == "BTC/USDT"));
}

#[tokio::test]
#[serial]
#[ignore = "hits the live Binance API"]
async fn exchange_fetches_recent_hourly_bars() {
    dotenvy::dotenv().ok();
    let provider = ExchangeProvider::from_context(&ProviderContext {
        symbol: "BINANCE:BTC/USDT".to_string(),
        timeframe: Timeframe::Minutes(60),
        config_dir: None,
    })
    .unwrap();

    let now = Utc::now();
    let bars = provider
        .fetch_bars(now - Duration::hours(6), now, 10)
        .await
        .unwrap();
    assert!(!bars.is_empty());
    assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
#[serial]
#[ignore = "needs CAPITALCOM_* credentials"]
async fn capitalcom_fetches_daily_bars() {
    dotenvy::dotenv().ok();
    let provider = CapitalComProvider::from_context(&ProviderContext {
        symbol: "US500".to_string(),
        timeframe: Timeframe::Days(1),
        config_dir: None,
    })
    .unwrap();

    let now = Utc::now();
    let bars = provider
        .fetch_bars(now - Duration::days(30), now, 1000)
        .await
        .unwrap();
    assert!(!bars.is_empty());
}
