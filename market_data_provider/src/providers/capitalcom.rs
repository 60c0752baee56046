//! Capital.com provider for stocks, forex, indices, and CFDs on crypto.
//!
//! The API is session-based: a `POST /session` call with the API key and a
//! SHA-256-digested password yields `CST`/`X-SECURITY-TOKEN` headers that
//! authenticate subsequent calls. A 401 clears the session and the request
//! is retried exactly once with a fresh session before surfacing
//! [`ProviderError::AuthenticationFailed`].
//!
//! Historical prices use calendar-window requests (max 1000 candles), so the
//! downloader drives this provider with the default
//! [`ChunkPlan::Calendar`](crate::providers::ChunkPlan) spans.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use shared_utils::env::optional_env_var;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{
    bar::Bar,
    symbol_info::{
        InstrumentType, OpeningHours, SessionTime, SymbolMetadata, around_the_clock,
        derive_price_scale,
    },
    timeframe::{ResolutionCodec, Timeframe, TimeframeCodec},
};
use crate::providers::{Provider, ProviderContext, ProviderError, config::ProviderConfig};

const LIVE_URL: &str = "https://api-capital.backend-capital.com";
const DEMO_URL: &str = "https://demo-api-capital.backend-capital.com";

static RESOLUTION_CODEC: ResolutionCodec = ResolutionCodec;

/// Instrument-type names reported by the API, mapped to our classification.
fn instrument_type(api_name: &str) -> InstrumentType {
    match api_name {
        "CURRENCIES" => InstrumentType::Forex,
        "CRYPTOCURRENCIES" => InstrumentType::Crypto,
        "INDICES" => InstrumentType::Index,
        _ => InstrumentType::Stock,
    }
}

#[derive(Default)]
struct Session {
    security_token: Option<String>,
    cst: Option<String>,
}

/// Capital.com data provider bound to one epic.
pub struct CapitalComProvider {
    epic: String,
    timeframe: Timeframe,
    native_timeframe: String,
    config: ProviderConfig,
    base_url: &'static str,
    client: Client,
    session: Mutex<Session>,
}

impl CapitalComProvider {
    /// Registry factory; see [`ProviderFactory`](crate::providers::ProviderFactory).
    pub fn factory(ctx: &ProviderContext) -> Result<Box<dyn Provider>, ProviderError> {
        Ok(Box::new(Self::from_context(ctx)?))
    }

    pub fn from_context(ctx: &ProviderContext) -> Result<Self, ProviderError> {
        let config = ProviderConfig::load(ctx.config_dir.as_deref(), "capitalcom", None)?;
        let native_timeframe = RESOLUTION_CODEC.to_native(&ctx.timeframe)?;
        let base_url = if config.get_bool("demo").unwrap_or(false) {
            DEMO_URL
        } else {
            LIVE_URL
        };
        Ok(Self {
            epic: ctx.symbol.clone(),
            timeframe: ctx.timeframe,
            native_timeframe,
            config,
            base_url,
            client: Client::new(),
            session: Mutex::new(Session::default()),
        })
    }

    fn epic(&self) -> Result<&str, ProviderError> {
        if self.epic.is_empty() {
            return Err(ProviderError::Symbol("symbol not provided".to_string()));
        }
        Ok(&self.epic)
    }

    /// Credential lookup: environment first, then `providers.toml`.
    fn credential(&self, env_name: &str, key: &str) -> Result<SecretString, ProviderError> {
        if let Some(v) = optional_env_var(env_name) {
            return Ok(SecretString::new(v.into()));
        }
        Ok(SecretString::new(self.config.require_str(key)?.to_string().into()))
    }

    /// The API expects `base64(sha256(password))`.
    fn digest_password(password: &str) -> String {
        BASE64.encode(Sha256::digest(password.as_bytes()))
    }

    async fn create_session(&self) -> Result<(), ProviderError> {
        let email = self.credential("CAPITALCOM_USER_EMAIL", "user_email")?;
        let api_key = self.credential("CAPITALCOM_API_KEY", "api_key")?;
        let password = self.credential("CAPITALCOM_API_PASSWORD", "api_password")?;

        let url = format!("{}/api/v1/session", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-CAP-API-KEY", api_key.expose_secret())
            .json(&json!({
                "identifier": email.expose_secret(),
                "password": Self::digest_password(password.expose_secret()),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let code = Self::error_code(response).await;
            return Err(ProviderError::AuthenticationFailed(code));
        }

        let mut session = self.session.lock().await;
        session.security_token = response
            .headers()
            .get("X-SECURITY-TOKEN")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        session.cst = response
            .headers()
            .get("CST")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!("capital.com session established");
        Ok(())
    }

    async fn error_code(response: reqwest::Response) -> String {
        match response.json::<Value>().await {
            Ok(body) => body
                .get("errorCode")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
            Err(_) => "Unknown error".to_string(),
        }
    }

    /// Authenticated call with a single forced re-auth retry on 401.
    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let api_key = self.credential("CAPITALCOM_API_KEY", "api_key")?;
        let url = format!("{}/api/v1/{endpoint}", self.base_url);

        for attempt in 0..2u8 {
            if self.session.lock().await.security_token.is_none() {
                self.create_session().await?;
            }

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X-CAP-API-KEY", api_key.expose_secret())
                .query(query);
            {
                let session = self.session.lock().await;
                if let Some(token) = &session.security_token {
                    request = request.header("X-SECURITY-TOKEN", token);
                }
                if let Some(cst) = &session.cst {
                    request = request.header("CST", cst);
                }
            }

            let response = request.send().await?;
            match response.status() {
                status if status.is_success() => return Ok(response.json::<Value>().await?),
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    debug!("session rejected, re-authenticating once");
                    let mut session = self.session.lock().await;
                    session.security_token = None;
                    session.cst = None;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(ProviderError::AuthenticationFailed(
                        Self::error_code(response).await,
                    ));
                }
                _ => return Err(ProviderError::Api(Self::error_code(response).await)),
            }
        }
        // Both attempts consumed by the 401 arms above.
        Err(ProviderError::AuthenticationFailed("Unknown error".to_string()))
    }

    async fn market_details(&self, epic: &str) -> Result<Value, ProviderError> {
        self.call(Method::GET, &format!("markets/{epic}"), &[]).await
    }

    fn parse_snapshot_time(raw: &str) -> Result<i64, ProviderError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.timestamp());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .map(|naive| naive.and_utc().timestamp())
            .map_err(|_| ProviderError::UnexpectedResponse(format!("snapshotTime: {raw}")))
    }

    fn parse_price(price: &Value) -> Result<Bar, ProviderError> {
        let ts_raw = price
            .get("snapshotTime")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::UnexpectedResponse("missing snapshotTime".into()))?;
        let bid = |field: &str| -> Result<f64, ProviderError> {
            price
                .pointer(&format!("/{field}/bid"))
                .and_then(Value::as_f64)
                .ok_or_else(|| ProviderError::UnexpectedResponse(format!("missing {field}.bid")))
        };
        Ok(Bar {
            timestamp: Self::parse_snapshot_time(ts_raw)?,
            open: bid("openPrice")?,
            high: bid("highPrice")?,
            low: bid("lowPrice")?,
            close: bid("closePrice")?,
            volume: price
                .get("lastTradedVolume")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        })
    }

    /// Opening hours reported as `marketTimes` entries, or 24×7 when absent.
    fn parse_sessions(
        details: &Value,
    ) -> (Vec<OpeningHours>, Vec<SessionTime>, Vec<SessionTime>) {
        let Some(times) = details
            .pointer("/openingHours/marketTimes")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
        else {
            return around_the_clock();
        };

        let mut opening_hours = Vec::new();
        let mut session_starts = Vec::new();
        let mut session_ends = Vec::new();
        for entry in times {
            let day = entry
                .get("dayOfWeek")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u8;
            let parse_time = |field: &str| {
                entry
                    .get(field)
                    .and_then(Value::as_str)
                    .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M:%S").ok())
            };
            let (Some(start), Some(end)) = (parse_time("openTime"), parse_time("closeTime"))
            else {
                continue;
            };
            opening_hours.push(OpeningHours { day, start, end });
            session_starts.push(SessionTime { day, time: start });
            session_ends.push(SessionTime { day, time: end });
        }
        if opening_hours.is_empty() {
            return around_the_clock();
        }
        (opening_hours, session_starts, session_ends)
    }
}

#[async_trait]
impl Provider for CapitalComProvider {
    fn name(&self) -> &'static str {
        "capitalcom"
    }

    fn symbol(&self) -> &str {
        &self.epic
    }

    fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    fn native_timeframe(&self) -> &str {
        &self.native_timeframe
    }

    fn codec(&self) -> &dyn TimeframeCodec {
        &RESOLUTION_CODEC
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.call(Method::GET, "markets", &[]).await?;
        let markets = response
            .get("markets")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::UnexpectedResponse("missing markets".into()))?;
        Ok(markets
            .iter()
            .filter_map(|m| m.get("epic").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn refresh_metadata(&self) -> Result<SymbolMetadata, ProviderError> {
        let epic = self.epic()?;
        let details = self.market_details(epic).await?;

        let kind = details
            .pointer("/instrument/type")
            .or_else(|| details.get("instrumentType"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let description = details
            .pointer("/instrument/name")
            .or_else(|| details.get("instrumentName"))
            .and_then(Value::as_str)
            .unwrap_or(epic)
            .to_string();

        let min_tick = details
            .get("minNormalStopOrLimitDistance")
            .or_else(|| details.pointer("/dealingRules/minStepDistance/value"))
            .and_then(Value::as_f64)
            .unwrap_or(0.01);
        let (price_scale, min_move) = derive_price_scale(min_tick);
        let (opening_hours, session_starts, session_ends) = Self::parse_sessions(&details);

        let currency = details
            .pointer("/currencies/0/code")
            .and_then(Value::as_str)
            .unwrap_or("USD")
            .to_string();
        let base_currency = details
            .pointer("/currencies/0/baseCode")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Ok(SymbolMetadata {
            prefix: "CAPITAL".to_string(),
            description,
            ticker: epic.to_string(),
            currency,
            base_currency,
            period: self.timeframe,
            instrument_type: instrument_type(kind),
            min_tick,
            price_scale,
            min_move,
            point_value: 1.0,
            timezone: chrono_tz::US::Eastern.name().to_string(),
            opening_hours,
            session_starts,
            session_ends,
            taker_fee: None,
            maker_fee: None,
            avg_spread: details.pointer("/snapshot/spreadValue").and_then(Value::as_f64),
        })
    }

    async fn fetch_bars(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        page_limit: u32,
    ) -> Result<Vec<Bar>, ProviderError> {
        let epic = self.epic()?;
        let query = [
            ("resolution", self.native_timeframe.clone()),
            ("from", window_start.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("to", window_end.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("max", page_limit.to_string()),
        ];
        debug!(%epic, from = %window_start, to = %window_end, "fetching prices");
        let response = self
            .call(Method::GET, &format!("prices/{epic}"), &query)
            .await?;
        let prices = response
            .get("prices")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::UnexpectedResponse("missing prices".into()))?;
        prices.iter().map(Self::parse_price).collect()
    }
}
