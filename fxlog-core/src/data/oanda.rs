//! OANDA v20 REST data source.
//!
//! Fetches mid-price candles from `/v3/instruments/{instrument}/candles` and
//! the tradable list from `/v3/accounts/{id}/instruments`. Incomplete
//! (still-forming) candles are dropped. Failures are not retried.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::provider::{DataError, MarketDataSource};
use crate::domain::{format_timestamp, Granularity, OhlcBar, OhlcSeries, Window};

pub const PRACTICE_API_URL: &str = "https://api-fxpractice.oanda.com";

/// Largest `count` the candles endpoint accepts.
const MAX_COUNT: usize = 5000;

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct Candle {
    time: String,
    complete: bool,
    mid: Option<Mid>,
}

#[derive(Debug, Deserialize)]
struct Mid {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    instruments: Vec<InstrumentInfo>,
}

#[derive(Debug, Deserialize)]
struct InstrumentInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: String,
}

/// Connection settings for the v20 API.
#[derive(Debug, Clone)]
pub struct OandaSettings {
    pub api_url: String,
    pub account_id: String,
    pub token: String,
    pub timeout: Duration,
}

impl OandaSettings {
    pub fn practice(account_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: PRACTICE_API_URL.to_string(),
            account_id: account_id.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct OandaSource {
    client: reqwest::blocking::Client,
    settings: OandaSettings,
}

impl OandaSource {
    pub fn new(settings: OandaSettings) -> Result<Self, DataError> {
        if settings.token.is_empty() {
            return Err(DataError::AuthenticationRequired(
                "OANDA API token is not set".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn candles_url(&self, instrument: &str) -> String {
        format!(
            "{}/v3/instruments/{instrument}/candles",
            self.settings.api_url.trim_end_matches('/')
        )
    }

    fn instruments_url(&self) -> String {
        format!(
            "{}/v3/accounts/{}/instruments",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.account_id
        )
    }

    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::blocking::Response, DataError> {
        self.client
            .get(url)
            .bearer_auth(&self.settings.token)
            .header("Accept-Datetime-Format", "RFC3339")
            .query(query)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))
    }
}

/// Query parameters for a candle request.
pub fn candle_query(granularity: Granularity, window: &Window) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("granularity", granularity.as_str().to_string()),
        ("price", "M".to_string()),
    ];
    match window {
        Window::Count(n) => query.push(("count", (*n).min(MAX_COUNT).to_string())),
        Window::Range { start, end } => {
            query.push(("from", format_timestamp(*start)));
            query.push(("to", format_timestamp(*end)));
        }
    }
    query
}

/// Decode a candles body into complete bars.
fn parse_candles(body: &str) -> Result<Vec<OhlcBar>, DataError> {
    let resp: CandlesResponse = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("candles: {e}")))?;

    let mut bars = Vec::with_capacity(resp.candles.len());
    for candle in resp.candles.into_iter().filter(|c| c.complete) {
        let mid = candle
            .mid
            .ok_or_else(|| DataError::ResponseFormatChanged("candle without mid prices".into()))?;
        let timestamp = DateTime::parse_from_rfc3339(&candle.time)
            .map_err(|e| {
                DataError::ResponseFormatChanged(format!("bad candle time '{}': {e}", candle.time))
            })?
            .with_timezone(&Utc);
        bars.push(OhlcBar {
            timestamp,
            open: price(&mid.o)?,
            high: price(&mid.h)?,
            low: price(&mid.l)?,
            close: price(&mid.c)?,
        });
    }
    Ok(bars)
}

fn price(s: &str) -> Result<f64, DataError> {
    s.parse()
        .map_err(|_| DataError::ResponseFormatChanged(format!("bad price '{s}'")))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error_message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

impl MarketDataSource for OandaSource {
    fn name(&self) -> &str {
        "oanda"
    }

    fn fetch(
        &self,
        instrument: &str,
        granularity: Granularity,
        window: &Window,
    ) -> Result<OhlcSeries, DataError> {
        let resp = self.get(&self.candles_url(instrument), &candle_query(granularity, window))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        match status.as_u16() {
            200 => {}
            400 | 404 => {
                tracing::debug!(instrument, message = %error_message(&body), "candles rejected");
                return Err(DataError::UnknownInstrument {
                    instrument: instrument.to_string(),
                });
            }
            401 | 403 => return Err(DataError::AuthenticationRequired(error_message(&body))),
            code => {
                return Err(DataError::Http {
                    status: code,
                    message: error_message(&body),
                })
            }
        }

        let bars = parse_candles(&body)?;
        tracing::debug!(instrument, bars = bars.len(), %granularity, "fetched candles");
        Ok(OhlcSeries::new(instrument, granularity, bars)?)
    }

    fn list_instruments(&self) -> Result<Vec<String>, DataError> {
        let resp = self.get(&self.instruments_url(), &[])?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        match status.as_u16() {
            200 => {}
            401 | 403 => return Err(DataError::AuthenticationRequired(error_message(&body))),
            code => {
                return Err(DataError::Http {
                    status: code,
                    message: error_message(&body),
                })
            }
        }
        let parsed: InstrumentsResponse = serde_json::from_str(&body)
            .map_err(|e| DataError::ResponseFormatChanged(format!("instruments: {e}")))?;
        let mut names: Vec<String> = parsed.instruments.into_iter().map(|i| i.name).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BODY: &str = r#"{
        "instrument": "EUR_USD",
        "granularity": "H1",
        "candles": [
            {"complete": true, "volume": 10, "time": "2024-01-02T00:00:00.000000000Z",
             "mid": {"o": "1.10400", "h": "1.10450", "l": "1.10380", "c": "1.10420"}},
            {"complete": true, "volume": 12, "time": "2024-01-02T01:00:00.000000000Z",
             "mid": {"o": "1.10420", "h": "1.10500", "l": "1.10410", "c": "1.10490"}},
            {"complete": false, "volume": 3, "time": "2024-01-02T02:00:00.000000000Z",
             "mid": {"o": "1.10490", "h": "1.10495", "l": "1.10480", "c": "1.10485"}}
        ]
    }"#;

    #[test]
    fn incomplete_candles_are_dropped() {
        let bars = parse_candles(BODY).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(bars[1].close, 1.1049);
    }

    #[test]
    fn malformed_price_is_a_format_error() {
        let body = BODY.replace("\"1.10420\"}", "\"n/a\"}");
        assert!(matches!(
            parse_candles(&body),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn count_query_is_clamped() {
        let q = candle_query(Granularity::H1, &Window::Count(10_000));
        assert!(q.contains(&("count", "5000".to_string())));
        assert!(q.contains(&("price", "M".to_string())));
    }

    #[test]
    fn range_query_uses_second_precision_utc() {
        let window = Window::Range {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 31, 12, 30, 0).unwrap(),
        };
        let q = candle_query(Granularity::M15, &window);
        assert!(q.contains(&("from", "2024-01-01T00:00:00Z".to_string())));
        assert!(q.contains(&("to", "2024-01-31T12:30:00Z".to_string())));
        assert!(q.contains(&("granularity", "M15".to_string())));
    }

    #[test]
    fn missing_token_is_refused() {
        assert!(matches!(
            OandaSource::new(OandaSettings::practice("101-001", "")),
            Err(DataError::AuthenticationRequired(_))
        ));
    }

    #[test]
    fn error_body_message_is_extracted() {
        assert_eq!(
            error_message(r#"{"errorMessage":"Invalid value specified for 'instrument'"}"#),
            "Invalid value specified for 'instrument'"
        );
    }
}
