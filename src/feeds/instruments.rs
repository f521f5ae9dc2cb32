use crate::error::ResolveError;
use crate::models::position::OptionKind;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

/// Maps (underlying, strike, kind, date) to a tradable `EXCHANGE:SYMBOL`.
pub trait InstrumentResolver: Send + Sync {
    /// Nearest unexpired option at exactly `strike`.
    fn option(
        &self,
        underlying: &str,
        strike: i64,
        kind: OptionKind,
        as_of: NaiveDate,
    ) -> Result<String, ResolveError>;

    /// Nearest unexpired future, used as the ATR reference feed.
    fn future(&self, underlying: &str, as_of: NaiveDate) -> Result<String, ResolveError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub exchange: String,
    pub tradingsymbol: String,
    pub name: String,
    pub instrument_type: String,
    pub strike: f64,
    pub expiry: NaiveDate,
}

impl Instrument {
    pub fn symbol(&self) -> String {
        format!("{}:{}", self.exchange, self.tradingsymbol)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    tradingsymbol: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    expiry: String,
    #[serde(default)]
    strike: Option<f64>,
    #[serde(default)]
    instrument_type: String,
    #[serde(default)]
    exchange: String,
}

/// In-memory derivatives catalog, loaded once at startup from the
/// exchange instrument dump.
#[derive(Debug, Default)]
pub struct InstrumentCatalog {
    instruments: Vec<Instrument>,
}

impl InstrumentCatalog {
    /// Parse a Kite instrument CSV dump. Rows without a parseable expiry
    /// (spot/index rows, malformed dates) are skipped.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut instruments = Vec::new();
        let mut skipped = 0usize;

        for row in reader.deserialize::<CsvRow>() {
            let row = row.context("malformed instrument row")?;
            let Ok(expiry) = NaiveDate::parse_from_str(row.expiry.trim(), "%Y-%m-%d") else {
                skipped += 1;
                continue;
            };
            instruments.push(Instrument {
                exchange: row.exchange,
                tradingsymbol: row.tradingsymbol,
                name: row.name,
                instrument_type: row.instrument_type,
                strike: row.strike.unwrap_or(0.0),
                expiry,
            });
        }

        info!("Instrument catalog: {} contracts ({skipped} rows skipped)", instruments.len());
        Ok(Self { instruments })
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    fn nearest<'a>(
        &'a self,
        as_of: NaiveDate,
        filter: impl Fn(&Instrument) -> bool,
    ) -> Option<&'a Instrument> {
        self.instruments
            .iter()
            .filter(|i| i.expiry >= as_of && filter(i))
            .min_by_key(|i| i.expiry)
    }
}

impl InstrumentResolver for InstrumentCatalog {
    fn option(
        &self,
        underlying: &str,
        strike: i64,
        kind: OptionKind,
        as_of: NaiveDate,
    ) -> Result<String, ResolveError> {
        let found = self.nearest(as_of, |i| {
            i.name == underlying
                && i.instrument_type == kind.code()
                && (i.strike - strike as f64).abs() < 1e-6
        });
        match found {
            Some(i) => {
                debug!(symbol = %i.tradingsymbol, expiry = %i.expiry, "Resolved {kind} {strike}");
                Ok(i.symbol())
            }
            None => Err(ResolveError::NoOption {
                underlying: underlying.to_string(),
                strike,
                kind,
            }),
        }
    }

    fn future(&self, underlying: &str, as_of: NaiveDate) -> Result<String, ResolveError> {
        self.nearest(as_of, |i| i.name == underlying && i.instrument_type == "FUT")
            .map(Instrument::symbol)
            .ok_or_else(|| ResolveError::NoFuture(underlying.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
instrument_token,exchange_token,tradingsymbol,name,last_price,expiry,strike,tick_size,lot_size,instrument_type,segment,exchange
1,1,NIFTY24JAN22500CE,\"NIFTY\",0,2024-01-25,22500,0.05,50,CE,NFO-OPT,NFO
2,2,NIFTY24JAN22500PE,\"NIFTY\",0,2024-01-25,22500,0.05,50,PE,NFO-OPT,NFO
3,3,NIFTY24FEB22500CE,\"NIFTY\",0,2024-02-29,22500,0.05,50,CE,NFO-OPT,NFO
4,4,NIFTY2411822500CE,\"NIFTY\",0,2024-01-18,22500,0.05,50,CE,NFO-OPT,NFO
5,5,NIFTY24JAN22550CE,\"NIFTY\",0,2024-01-25,22550,0.05,50,CE,NFO-OPT,NFO
6,6,NIFTY24JANFUT,\"NIFTY\",0,2024-01-25,0,0.05,50,FUT,NFO-FUT,NFO
7,7,NIFTY24FEBFUT,\"NIFTY\",0,2024-02-29,0,0.05,50,FUT,NFO-FUT,NFO
8,8,BANKNIFTY24JAN48000CE,\"BANKNIFTY\",0,2024-01-25,48000,0.05,15,CE,NFO-OPT,NFO
9,9,BROKENROW,\"NIFTY\",0,,22500,0.05,50,CE,NFO-OPT,NFO
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_skips_rows_without_expiry() {
        let cat = InstrumentCatalog::from_csv(DUMP).unwrap();
        assert_eq!(cat.len(), 8);
    }

    #[test]
    fn test_header_only_dump_is_empty() {
        let header = DUMP.lines().next().unwrap();
        let cat = InstrumentCatalog::from_csv(header).unwrap();
        assert!(cat.is_empty());
        assert!(!InstrumentCatalog::from_csv(DUMP).unwrap().is_empty());
    }

    #[test]
    fn test_nearest_unexpired_option() {
        let cat = InstrumentCatalog::from_csv(DUMP).unwrap();
        let ce = cat.option("NIFTY", 22500, OptionKind::Call, date(2024, 1, 15)).unwrap();
        assert_eq!(ce, "NFO:NIFTY2411822500CE");

        // Expiry day itself still counts as unexpired
        let ce = cat.option("NIFTY", 22500, OptionKind::Call, date(2024, 1, 18)).unwrap();
        assert_eq!(ce, "NFO:NIFTY2411822500CE");

        let ce = cat.option("NIFTY", 22500, OptionKind::Call, date(2024, 1, 19)).unwrap();
        assert_eq!(ce, "NFO:NIFTY24JAN22500CE");

        let pe = cat.option("NIFTY", 22500, OptionKind::Put, date(2024, 1, 19)).unwrap();
        assert_eq!(pe, "NFO:NIFTY24JAN22500PE");
    }

    #[test]
    fn test_missing_strike_is_an_error() {
        let cat = InstrumentCatalog::from_csv(DUMP).unwrap();
        let err = cat.option("NIFTY", 22600, OptionKind::Call, date(2024, 1, 15)).unwrap_err();
        assert!(matches!(err, ResolveError::NoOption { strike: 22600, .. }));

        // Underlying name must match exactly
        assert!(cat.option("NIFTY", 48000, OptionKind::Call, date(2024, 1, 15)).is_err());
    }

    #[test]
    fn test_nearest_future() {
        let cat = InstrumentCatalog::from_csv(DUMP).unwrap();
        assert_eq!(cat.future("NIFTY", date(2024, 1, 15)).unwrap(), "NFO:NIFTY24JANFUT");
        assert_eq!(cat.future("NIFTY", date(2024, 2, 1)).unwrap(), "NFO:NIFTY24FEBFUT");
        assert!(matches!(
            cat.future("NIFTY", date(2024, 3, 1)),
            Err(ResolveError::NoFuture(_))
        ));
    }
}
