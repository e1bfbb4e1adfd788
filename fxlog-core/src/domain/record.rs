//! Trade-log record: the one item persisted per instrument per run.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::granularity::Granularity;
use super::ids::TradeId;
use crate::normalize::{normalize_item, AttributeValue, Item, NormalizationError, RawValue};

pub const ATTR_TRADE_ID: &str = "TradeID";
pub const ATTR_INSTRUMENT: &str = "Instrument";
pub const ATTR_GRANULARITY: &str = "Granularity";
pub const ATTR_TIMESTAMP: &str = "Timestamp";

/// The fixed indicator set, in persisted attribute order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma20,
    Sma50,
    Ema20,
    Rsi14,
    Macd,
    MacdSignal,
    BbUpper,
    BbLower,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 8] = [
        Self::Sma20,
        Self::Sma50,
        Self::Ema20,
        Self::Rsi14,
        Self::Macd,
        Self::MacdSignal,
        Self::BbUpper,
        Self::BbLower,
    ];

    /// Persisted attribute name.
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Sma20 => "SMA_20",
            Self::Sma50 => "SMA_50",
            Self::Ema20 => "EMA_20",
            Self::Rsi14 => "RSI_14",
            Self::Macd => "MACD",
            Self::MacdSignal => "MACD_Signal",
            Self::BbUpper => "BB_Upper",
            Self::BbLower => "BB_Lower",
        }
    }

    pub fn from_attribute(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.attribute() == name)
    }
}

/// Latest value of every indicator at the most recent bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_20: f64,
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
}

impl IndicatorSet {
    pub fn get(&self, kind: IndicatorKind) -> f64 {
        match kind {
            IndicatorKind::Sma20 => self.sma_20,
            IndicatorKind::Sma50 => self.sma_50,
            IndicatorKind::Ema20 => self.ema_20,
            IndicatorKind::Rsi14 => self.rsi_14,
            IndicatorKind::Macd => self.macd,
            IndicatorKind::MacdSignal => self.macd_signal,
            IndicatorKind::BbUpper => self.bb_upper,
            IndicatorKind::BbLower => self.bb_lower,
        }
    }

    fn set(&mut self, kind: IndicatorKind, value: f64) {
        match kind {
            IndicatorKind::Sma20 => self.sma_20 = value,
            IndicatorKind::Sma50 => self.sma_50 = value,
            IndicatorKind::Ema20 => self.ema_20 = value,
            IndicatorKind::Rsi14 => self.rsi_14 = value,
            IndicatorKind::Macd => self.macd = value,
            IndicatorKind::MacdSignal => self.macd_signal = value,
            IndicatorKind::BbUpper => self.bb_upper = value,
            IndicatorKind::BbLower => self.bb_lower = value,
        }
    }

    /// `(attribute name, value)` pairs in fixed order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        IndicatorKind::ALL
            .iter()
            .map(move |k| (k.attribute(), self.get(*k)))
    }
}

/// Errors decoding a stored item back into a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("missing attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("attribute '{name}' has the wrong type")]
    WrongType { name: String },

    #[error("attribute '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// Identity fields plus the indicator set.
///
/// The attribute set is closed: decoding rejects anything outside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: TradeId,
    pub instrument: String,
    pub granularity: Granularity,
    /// Epoch seconds.
    pub timestamp: i64,
    pub indicators: IndicatorSet,
}

impl TradeRecord {
    /// Heterogeneous attribute view, ready for normalization.
    pub fn to_raw(&self) -> RawValue {
        let mut map = BTreeMap::new();
        map.insert(
            ATTR_TRADE_ID.to_string(),
            RawValue::Text(self.trade_id.0.clone()),
        );
        map.insert(
            ATTR_INSTRUMENT.to_string(),
            RawValue::Text(self.instrument.clone()),
        );
        map.insert(
            ATTR_GRANULARITY.to_string(),
            RawValue::Text(self.granularity.as_str().to_string()),
        );
        map.insert(ATTR_TIMESTAMP.to_string(), RawValue::Integer(self.timestamp));
        for (name, value) in self.indicators.entries() {
            map.insert(name.to_string(), RawValue::Real(value));
        }
        RawValue::Map(map)
    }

    /// Normalized storage item.
    pub fn to_item(&self) -> Result<Item, NormalizationError> {
        normalize_item(&self.to_raw())
    }

    /// Decode a stored item. Unknown attributes are rejected.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        let mut trade_id = None;
        let mut instrument = None;
        let mut granularity = None;
        let mut timestamp = None;
        let mut indicators = IndicatorSet {
            sma_20: f64::NAN,
            sma_50: f64::NAN,
            ema_20: f64::NAN,
            rsi_14: f64::NAN,
            macd: f64::NAN,
            macd_signal: f64::NAN,
            bb_upper: f64::NAN,
            bb_lower: f64::NAN,
        };
        let mut seen = Vec::with_capacity(IndicatorKind::ALL.len());

        for (name, value) in item {
            match name.as_str() {
                ATTR_TRADE_ID => trade_id = Some(TradeId(text(name, value)?.to_string())),
                ATTR_INSTRUMENT => instrument = Some(text(name, value)?.to_string()),
                ATTR_GRANULARITY => {
                    let g = text(name, value)?
                        .parse::<Granularity>()
                        .map_err(|e| RecordError::Invalid {
                            name: name.clone(),
                            reason: e.to_string(),
                        })?;
                    granularity = Some(g);
                }
                ATTR_TIMESTAMP => {
                    let ts = number(name, value)?
                        .to_i64()
                        .ok_or_else(|| RecordError::Invalid {
                            name: name.clone(),
                            reason: "not an integer".into(),
                        })?;
                    timestamp = Some(ts);
                }
                other => {
                    let kind = IndicatorKind::from_attribute(other)
                        .ok_or_else(|| RecordError::UnknownAttribute(other.to_string()))?;
                    // Back through text, mirroring the write path.
                    let v = number(name, value)?
                        .to_string()
                        .parse::<f64>()
                        .map_err(|e| RecordError::Invalid {
                            name: name.clone(),
                            reason: e.to_string(),
                        })?;
                    indicators.set(kind, v);
                    seen.push(kind);
                }
            }
        }

        if let Some(missing) = IndicatorKind::ALL.iter().find(|k| !seen.contains(k)) {
            return Err(RecordError::MissingAttribute(missing.attribute()));
        }

        Ok(Self {
            trade_id: trade_id.ok_or(RecordError::MissingAttribute(ATTR_TRADE_ID))?,
            instrument: instrument.ok_or(RecordError::MissingAttribute(ATTR_INSTRUMENT))?,
            granularity: granularity.ok_or(RecordError::MissingAttribute(ATTR_GRANULARITY))?,
            timestamp: timestamp.ok_or(RecordError::MissingAttribute(ATTR_TIMESTAMP))?,
            indicators,
        })
    }
}

fn text<'a>(name: &str, value: &'a AttributeValue) -> Result<&'a str, RecordError> {
    value.as_str().ok_or_else(|| RecordError::WrongType {
        name: name.to_string(),
    })
}

fn number(name: &str, value: &AttributeValue) -> Result<rust_decimal::Decimal, RecordError> {
    value.as_decimal().ok_or_else(|| RecordError::WrongType {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> TradeRecord {
        TradeRecord {
            trade_id: TradeId("1700000000000-000001-deadbeef".into()),
            instrument: "EUR_USD".into(),
            granularity: Granularity::H1,
            timestamp: 1_700_000_000,
            indicators: IndicatorSet {
                sma_20: 1.00495,
                sma_50: 1.00345,
                ema_20: 1.0049,
                rsi_14: 100.0,
                macd: 0.00065,
                macd_signal: 0.00061,
                bb_upper: 1.0061,
                bb_lower: 1.0038,
            },
        }
    }

    #[test]
    fn item_has_exact_attribute_set() {
        let item = sample().to_item().unwrap();
        let keys: Vec<&str> = item.keys().map(|k| k.as_str()).collect();
        assert_eq!(item.len(), 12);
        for name in [
            "TradeID",
            "Instrument",
            "Granularity",
            "Timestamp",
            "SMA_20",
            "SMA_50",
            "EMA_20",
            "RSI_14",
            "MACD",
            "MACD_Signal",
            "BB_Upper",
            "BB_Lower",
        ] {
            assert!(keys.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn item_numbers_are_exact_decimals() {
        let item = sample().to_item().unwrap();
        assert_eq!(item["SMA_20"], AttributeValue::N(dec!(1.00495)));
        assert_eq!(item["Timestamp"], AttributeValue::N(dec!(1700000000)));
        assert_eq!(item["Granularity"], AttributeValue::S("H1".into()));
    }

    #[test]
    fn item_decodes_back() {
        let record = sample();
        let decoded = TradeRecord::from_item(&record.to_item().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn decoding_rejects_unknown_attribute() {
        let mut item = sample().to_item().unwrap();
        item.insert("Strategy".into(), AttributeValue::S("sma".into()));
        assert_eq!(
            TradeRecord::from_item(&item),
            Err(RecordError::UnknownAttribute("Strategy".into()))
        );
    }

    #[test]
    fn decoding_reports_missing_indicator() {
        let mut item = sample().to_item().unwrap();
        item.remove("RSI_14");
        assert_eq!(
            TradeRecord::from_item(&item),
            Err(RecordError::MissingAttribute("RSI_14"))
        );
    }

    #[test]
    fn nan_indicator_fails_normalization() {
        let mut record = sample();
        record.indicators.macd = f64::NAN;
        assert!(matches!(
            record.to_item(),
            Err(NormalizationError::NonFinite { .. })
        ));
    }
}
