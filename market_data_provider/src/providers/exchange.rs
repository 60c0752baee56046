//! Crypto-exchange provider speaking the Binance-compatible REST dialect.
//!
//! The symbol spec carries the venue: `"BINANCE:BTC/USDT"`. The venue id
//! selects the config sub-section (`[exchange.binance]` over `[exchange]`),
//! the base URL, and the known kline page limit. Venues without a built-in
//! base URL must configure `base_url` in `providers.toml`.
//!
//! Crypto markets trade around the clock, so metadata always reports 24×7
//! opening hours and sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use shared_utils::env::optional_env_var;
use tracing::debug;

use crate::models::{
    bar::Bar,
    symbol_info::{InstrumentType, SymbolMetadata, around_the_clock, derive_price_scale},
    timeframe::{SuffixCodec, Timeframe, TimeframeCodec},
};
use crate::providers::{
    ChunkPlan, Provider, ProviderContext, ProviderError, config::ProviderConfig,
};

/// Known kline page limits per venue; unknown venues get a conservative
/// default.
const KNOWN_LIMITS: &[(&str, u32)] = &[
    ("binance", 1000),
    ("binanceus", 1000),
    ("bitmex", 500),
    ("bybit", 200),
    ("coinbase", 300),
    ("kraken", 720),
    ("kucoin", 1500),
    ("okx", 200),
    ("huobi", 2000),
];

const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Venues with a built-in REST endpoint.
const KNOWN_BASE_URLS: &[(&str, &str)] = &[
    ("binance", "https://api.binance.com"),
    ("binanceus", "https://api.binance.us"),
];

static SUFFIX_CODEC: SuffixCodec = SuffixCodec;

fn known_limit(exchange: &str) -> u32 {
    KNOWN_LIMITS
        .iter()
        .find(|(name, _)| *name == exchange)
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_PAGE_LIMIT)
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<MarketInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    filters: Vec<MarketFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketFilter {
    filter_type: String,
    #[serde(default)]
    tick_size: Option<String>,
}

/// Provider for cryptocurrency exchanges with a Binance-compatible API.
pub struct ExchangeProvider {
    exchange: String,
    market: Option<String>,
    timeframe: Timeframe,
    native_timeframe: String,
    base_url: String,
    page_limit: u32,
    client: Client,
    limiter: DefaultDirectRateLimiter,
}

impl ExchangeProvider {
    /// Registry factory; see [`ProviderFactory`](crate::providers::ProviderFactory).
    pub fn factory(ctx: &ProviderContext) -> Result<Box<dyn Provider>, ProviderError> {
        Ok(Box::new(Self::from_context(ctx)?))
    }

    /// Builds a provider from a symbol spec of the form `EXCHANGE:BASE/QUOTE`
    /// (or a bare exchange name, which suffices for symbol listing).
    pub fn from_context(ctx: &ProviderContext) -> Result<Self, ProviderError> {
        let (exchange, market) = match ctx.symbol.split_once(':') {
            Some((xchg, market)) => (xchg, Some(market.to_string())),
            None => (ctx.symbol.as_str(), None),
        };
        if exchange.is_empty() {
            return Err(ProviderError::Symbol(
                "exchange name not provided; use 'EXCHANGE:SYMBOL' format \
                 (or a bare exchange name to list symbols)"
                    .to_string(),
            ));
        }
        let exchange = exchange.to_lowercase();

        let config = ProviderConfig::load(ctx.config_dir.as_deref(), "exchange", Some(&exchange))?;

        let base_url = config
            .get_str("base_url")
            .map(str::to_string)
            .or_else(|| {
                KNOWN_BASE_URLS
                    .iter()
                    .find(|(name, _)| *name == exchange)
                    .map(|(_, url)| (*url).to_string())
            })
            .ok_or_else(|| ProviderError::ConfigurationMissing(format!("base_url ({exchange})")))?;

        let api_key = optional_env_var(&format!("{}_API_KEY", exchange.to_uppercase()))
            .or_else(|| config.get_str("api_key").map(str::to_string))
            .map(|k| SecretString::new(k.into()));

        let mut headers = header::HeaderMap::new();
        if let Some(key) = &api_key {
            let value = header::HeaderValue::from_str(key.expose_secret())
                .map_err(|e| ProviderError::Api(format!("invalid api key: {e}")))?;
            headers.insert("X-MBX-APIKEY", value);
        }
        let client = Client::builder().default_headers(headers).build()?;

        let native_timeframe = SUFFIX_CODEC.to_native(&ctx.timeframe)?;

        Ok(Self {
            page_limit: known_limit(&exchange),
            exchange,
            market,
            timeframe: ctx.timeframe,
            native_timeframe,
            base_url,
            client,
            // Public market-data endpoints tolerate a handful of requests per
            // second; pacing keeps long backfills inside the venue's budget.
            limiter: RateLimiter::direct(Quota::per_second(nonzero!(5u32))),
        })
    }

    fn market(&self) -> Result<&str, ProviderError> {
        self.market
            .as_deref()
            .ok_or_else(|| ProviderError::Symbol("symbol not provided".to_string()))
    }

    /// REST ticker: `BTC/USDT:USDT` (swap notation) collapses to `BTCUSDT`.
    fn rest_symbol(&self) -> Result<String, ProviderError> {
        let market = self.market()?;
        let spot = market.split(':').next().unwrap_or(market);
        Ok(spot.replace('/', ""))
    }

    async fn exchange_info(&self) -> Result<ExchangeInfo, ProviderError> {
        self.limiter.until_ready().await;
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(ProviderError::Api(message));
        }
        Ok(response.json::<ExchangeInfo>().await?)
    }

    fn parse_kline(row: &Value) -> Result<Bar, ProviderError> {
        let cells = row
            .as_array()
            .ok_or_else(|| ProviderError::UnexpectedResponse("kline row is not an array".into()))?;
        if cells.len() < 6 {
            return Err(ProviderError::UnexpectedResponse(format!(
                "kline row has {} fields, expected at least 6",
                cells.len()
            )));
        }
        let open_ms = cells[0]
            .as_i64()
            .ok_or_else(|| ProviderError::UnexpectedResponse("kline open time".into()))?;
        let price = |idx: usize, name: &str| -> Result<f64, ProviderError> {
            let cell = &cells[idx];
            cell.as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .or_else(|| cell.as_f64())
                .ok_or_else(|| ProviderError::UnexpectedResponse(format!("kline {name}")))
        };
        Ok(Bar {
            timestamp: open_ms / 1000,
            open: price(1, "open")?,
            high: price(2, "high")?,
            low: price(3, "low")?,
            close: price(4, "close")?,
            volume: price(5, "volume")?,
        })
    }
}

#[async_trait]
impl Provider for ExchangeProvider {
    fn name(&self) -> &'static str {
        "exchange"
    }

    fn symbol(&self) -> &str {
        self.market.as_deref().unwrap_or(&self.exchange)
    }

    fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    fn native_timeframe(&self) -> &str {
        &self.native_timeframe
    }

    fn codec(&self) -> &dyn TimeframeCodec {
        &SUFFIX_CODEC
    }

    fn chunking(&self) -> ChunkPlan {
        ChunkPlan::Paged {
            page_limit: self.page_limit,
        }
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let info = self.exchange_info().await?;
        Ok(info
            .symbols
            .into_iter()
            .map(|m| format!("{}/{}", m.base_asset, m.quote_asset))
            .collect())
    }

    async fn refresh_metadata(&self) -> Result<SymbolMetadata, ProviderError> {
        let ticker = self.rest_symbol()?;
        let info = self.exchange_info().await?;
        let market = info
            .symbols
            .into_iter()
            .find(|m| m.symbol == ticker)
            .ok_or_else(|| ProviderError::Symbol(format!("unknown market: {ticker}")))?;

        let min_tick = market
            .filters
            .iter()
            .find(|f| f.filter_type == "PRICE_FILTER")
            .and_then(|f| f.tick_size.as_deref())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                ProviderError::UnexpectedResponse(format!("no price filter for {ticker}"))
            })?;
        let (price_scale, min_move) = derive_price_scale(min_tick);
        let (opening_hours, session_starts, session_ends) = around_the_clock();

        Ok(SymbolMetadata {
            prefix: self.exchange.to_uppercase(),
            description: format!("{} / {} Spot", market.base_asset, market.quote_asset),
            ticker: market.symbol,
            currency: market.quote_asset,
            base_currency: market.base_asset,
            period: self.timeframe,
            instrument_type: InstrumentType::Crypto,
            min_tick,
            price_scale,
            min_move,
            point_value: 1.0,
            timezone: chrono_tz::UTC.name().to_string(),
            opening_hours,
            session_starts,
            session_ends,
            taker_fee: None,
            maker_fee: None,
            avg_spread: None,
        })
    }

    async fn fetch_bars(
        &self,
        window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
        page_limit: u32,
    ) -> Result<Vec<Bar>, ProviderError> {
        let ticker = self.rest_symbol()?;
        self.limiter.until_ready().await;

        let url = format!("{}/api/v3/klines", self.base_url);
        debug!(%ticker, start = %window_start, limit = page_limit, "fetching klines");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", ticker.as_str()),
                ("interval", self.native_timeframe.as_str()),
                ("startTime", &window_start.timestamp_millis().to_string()),
                ("limit", &page_limit.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(ProviderError::Api(message));
        }

        let rows = response.json::<Vec<Value>>().await?;
        rows.iter().map(Self::parse_kline).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(symbol: &str) -> ProviderContext {
        ProviderContext {
            symbol: symbol.to_string(),
            timeframe: Timeframe::Minutes(60),
            config_dir: None,
        }
    }

    #[test]
    fn symbol_spec_parsing() {
        let p = ExchangeProvider::from_context(&ctx("BINANCE:BTC/USDT")).unwrap();
        assert_eq!(p.exchange, "binance");
        assert_eq!(p.symbol(), "BTC/USDT");
        assert_eq!(p.rest_symbol().unwrap(), "BTCUSDT");
        assert_eq!(p.native_timeframe(), "1h");
    }

    #[test]
    fn swap_notation_collapses() {
        let p = ExchangeProvider::from_context(&ctx("BINANCE:BTC/USDT:USDT")).unwrap();
        assert_eq!(p.rest_symbol().unwrap(), "BTCUSDT");
    }

    #[test]
    fn bare_exchange_lists_but_cannot_fetch() {
        let p = ExchangeProvider::from_context(&ctx("BINANCE")).unwrap();
        assert!(matches!(p.rest_symbol(), Err(ProviderError::Symbol(_))));
    }

    #[test]
    fn empty_spec_rejected() {
        assert!(matches!(
            ExchangeProvider::from_context(&ctx("")),
            Err(ProviderError::Symbol(_))
        ));
        assert!(matches!(
            ExchangeProvider::from_context(&ctx(":BTC/USDT")),
            Err(ProviderError::Symbol(_))
        ));
    }

    #[test]
    fn unknown_venue_requires_base_url() {
        let err = ExchangeProvider::from_context(&ctx("HOUSEEXCHANGE:BTC/USDT"))
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::ConfigurationMissing(_)));
    }

    #[test]
    fn page_limits_by_venue() {
        assert_eq!(known_limit("binance"), 1000);
        assert_eq!(known_limit("bybit"), 200);
        assert_eq!(known_limit("somewhere-new"), DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn kline_rows_parse_strings_and_numbers() {
        let row = serde_json::json!([
            1_700_000_000_000i64,
            "37000.1",
            "37100.5",
            "36900.0",
            "37050.2",
            "123.45"
        ]);
        let bar = ExchangeProvider::parse_kline(&row).unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000);
        assert_eq!(bar.open, 37000.1);
        assert_eq!(bar.volume, 123.45);

        let short = serde_json::json!([1i64, "2"]);
        assert!(ExchangeProvider::parse_kline(&short).is_err());
    }
}
