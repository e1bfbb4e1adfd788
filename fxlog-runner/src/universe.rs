//! Instrument universe for a run.
//!
//! Either one configured instrument or every instrument the data source can
//! list. A configured instrument that is malformed or not tradable falls back
//! to [`DEFAULT_INSTRUMENT`].

use fxlog_core::data::{DataError, MarketDataSource};

use crate::config::DEFAULT_INSTRUMENT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseSelection {
    Single(String),
    All,
}

/// `BASE_QUOTE` with upper-case alphanumeric legs, e.g. `EUR_USD`, `DE30_EUR`.
pub fn is_valid_instrument(name: &str) -> bool {
    let mut legs = name.split('_');
    let valid_leg = |leg: Option<&str>| {
        leg.is_some_and(|l| {
            !l.is_empty() && l.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        })
    };
    valid_leg(legs.next()) && valid_leg(legs.next()) && legs.next().is_none()
}

/// Instruments to process, in order.
///
/// Errors only when the full list was requested and could not be obtained.
pub fn resolve_universe(
    source: &dyn MarketDataSource,
    selection: &UniverseSelection,
) -> Result<Vec<String>, DataError> {
    match selection {
        UniverseSelection::All => {
            let instruments = source.list_instruments()?;
            if instruments.is_empty() {
                return Err(DataError::Other(format!(
                    "{} lists no tradable instruments",
                    source.name()
                )));
            }
            tracing::info!(count = instruments.len(), source = source.name(), "resolved universe");
            Ok(instruments)
        }
        UniverseSelection::Single(requested) => Ok(vec![resolve_single(source, requested)]),
    }
}

fn resolve_single(source: &dyn MarketDataSource, requested: &str) -> String {
    if !is_valid_instrument(requested) {
        tracing::warn!(
            requested,
            fallback = DEFAULT_INSTRUMENT,
            "malformed instrument, using default"
        );
        return DEFAULT_INSTRUMENT.to_string();
    }
    match source.list_instruments() {
        Ok(tradable) if tradable.iter().any(|i| i == requested) => requested.to_string(),
        Ok(_) => {
            tracing::warn!(
                requested,
                fallback = DEFAULT_INSTRUMENT,
                "instrument not tradable, using default"
            );
            DEFAULT_INSTRUMENT.to_string()
        }
        Err(e) => {
            tracing::warn!(requested, error = %e, "could not verify instrument, using it as given");
            requested.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxlog_core::data::StaticSource;
    use fxlog_core::domain::{Granularity, OhlcSeries, Window};

    fn source() -> StaticSource {
        StaticSource::new()
            .with_bars("EUR_USD", Vec::new())
            .with_bars("GBP_USD", Vec::new())
    }

    struct Unlistable;

    impl MarketDataSource for Unlistable {
        fn name(&self) -> &str {
            "unlistable"
        }

        fn fetch(
            &self,
            instrument: &str,
            _granularity: Granularity,
            _window: &Window,
        ) -> Result<OhlcSeries, DataError> {
            Err(DataError::UnknownInstrument {
                instrument: instrument.to_string(),
            })
        }

        fn list_instruments(&self) -> Result<Vec<String>, DataError> {
            Err(DataError::NetworkUnreachable("connection refused".into()))
        }
    }

    #[test]
    fn instrument_name_shape() {
        assert!(is_valid_instrument("EUR_USD"));
        assert!(is_valid_instrument("DE30_EUR"));
        assert!(!is_valid_instrument("eur_usd"));
        assert!(!is_valid_instrument("EURUSD"));
        assert!(!is_valid_instrument("EUR_USD_X"));
        assert!(!is_valid_instrument("_USD"));
    }

    #[test]
    fn tradable_instrument_is_kept() {
        let universe =
            resolve_universe(&source(), &UniverseSelection::Single("GBP_USD".into())).unwrap();
        assert_eq!(universe, vec!["GBP_USD".to_string()]);
    }

    #[test]
    fn untradable_or_malformed_falls_back() {
        for requested in ["XAU_CHF", "not an instrument", ""] {
            let universe =
                resolve_universe(&source(), &UniverseSelection::Single(requested.into())).unwrap();
            assert_eq!(universe, vec!["EUR_USD".to_string()], "{requested}");
        }
    }

    #[test]
    fn unverifiable_single_instrument_is_used_as_given() {
        let universe =
            resolve_universe(&Unlistable, &UniverseSelection::Single("USD_JPY".into())).unwrap();
        assert_eq!(universe, vec!["USD_JPY".to_string()]);
    }

    #[test]
    fn full_list_failure_is_an_error() {
        assert!(resolve_universe(&Unlistable, &UniverseSelection::All).is_err());
        assert!(resolve_universe(&StaticSource::new(), &UniverseSelection::All).is_err());
    }

    #[test]
    fn full_list_comes_from_source() {
        let universe = resolve_universe(&source(), &UniverseSelection::All).unwrap();
        assert_eq!(universe, vec!["EUR_USD".to_string(), "GBP_USD".to_string()]);
    }
}
