//! Static per-symbol metadata and its derivation rules.
//!
//! A [`SymbolMetadata`] is computed once by a provider, persisted next to the
//! bar file by the metadata store, and reused until a caller forces a
//! refresh. The price-scale derivation follows the legacy convention of
//! scaling the tick size by ten until it reaches one.

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::timeframe::Timeframe;

/// Broad classification of a tradable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Crypto,
    Forex,
    Stock,
    Index,
}

/// One weekly opening interval. `day` is 0-based with Monday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub day: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A session boundary (start or end) on one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    pub day: u8,
    pub time: NaiveTime,
}

/// Static descriptor of a tradable instrument, as reported by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetadata {
    /// Venue identifier, e.g. `"BINANCE"` or `"CAPITAL"`.
    pub prefix: String,
    /// Human-readable description.
    pub description: String,
    /// Provider-native ticker.
    pub ticker: String,
    /// Quote currency.
    pub currency: String,
    /// Base currency, empty when the source does not report one.
    pub base_currency: String,
    /// Canonical timeframe this metadata was captured for.
    pub period: Timeframe,
    #[serde(rename = "type")]
    pub instrument_type: InstrumentType,
    /// Smallest price increment.
    pub min_tick: f64,
    /// Smallest power of ten such that `min_tick * price_scale >= 1`.
    pub price_scale: u64,
    /// `min_tick` scaled by `price_scale`.
    pub min_move: f64,
    /// Cash value of a one-point move.
    pub point_value: f64,
    /// IANA timezone name of the venue.
    pub timezone: String,
    pub opening_hours: Vec<OpeningHours>,
    pub session_starts: Vec<SessionTime>,
    pub session_ends: Vec<SessionTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taker_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maker_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_spread: Option<f64>,
}

impl SymbolMetadata {
    /// Parses the stored timezone name, if it is a valid IANA identifier.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }
}

/// Derives `(price_scale, min_move)` from a tick size by repeated ×10
/// scaling until the scaled tick reaches one.
///
/// `derive_price_scale(0.01)` is `(100, 1.0)`; a tick of `1.0` or larger
/// keeps scale 1.
pub fn derive_price_scale(min_tick: f64) -> (u64, f64) {
    let mut price_scale: u64 = 1;
    let mut min_move = min_tick;
    while min_move < 1.0 && price_scale < 1_000_000_000_000 {
        price_scale *= 10;
        min_move *= 10.0;
    }
    (price_scale, min_move)
}

/// 24×7 opening hours and session boundaries for always-open markets.
pub fn around_the_clock() -> (Vec<OpeningHours>, Vec<SessionTime>, Vec<SessionTime>) {
    let open = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
    let close = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();

    let mut opening_hours = Vec::with_capacity(7);
    let mut session_starts = Vec::with_capacity(7);
    let mut session_ends = Vec::with_capacity(7);
    for day in 0..7u8 {
        opening_hours.push(OpeningHours {
            day,
            start: open,
            end: close,
        });
        session_starts.push(SessionTime { day, time: open });
        session_ends.push(SessionTime { day, time: close });
    }
    (opening_hours, session_starts, session_ends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_scale_from_tick() {
        assert_eq!(derive_price_scale(0.01), (100, 1.0));
        assert_eq!(derive_price_scale(0.5), (10, 5.0));
        assert_eq!(derive_price_scale(1.0), (1, 1.0));
        assert_eq!(derive_price_scale(25.0), (1, 25.0));

        let (scale, min_move) = derive_price_scale(0.001);
        assert_eq!(scale, 1000);
        assert!((min_move - 1.0).abs() < 1e-9);
    }

    #[test]
    fn always_open_covers_the_week() {
        let (hours, starts, ends) = around_the_clock();
        assert_eq!(hours.len(), 7);
        assert_eq!(starts.len(), 7);
        assert_eq!(ends.len(), 7);
        assert_eq!(hours[6].day, 6);
        assert_eq!(hours[0].start, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(hours[0].end, NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn metadata_toml_round_trip() {
        let (opening_hours, session_starts, session_ends) = around_the_clock();
        let meta = SymbolMetadata {
            prefix: "BINANCE".into(),
            description: "BTC / USDT Spot".into(),
            ticker: "BTCUSDT".into(),
            currency: "USDT".into(),
            base_currency: "BTC".into(),
            period: Timeframe::Minutes(60),
            instrument_type: InstrumentType::Crypto,
            min_tick: 0.01,
            price_scale: 100,
            min_move: 1.0,
            point_value: 1.0,
            timezone: "UTC".into(),
            opening_hours,
            session_starts,
            session_ends,
            taker_fee: Some(0.001),
            maker_fee: Some(0.001),
            avg_spread: None,
        };

        let text = toml::to_string(&meta).unwrap();
        let back: SymbolMetadata = toml::from_str(&text).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.tz(), Some(chrono_tz::UTC));
    }
}
