//! Instrument Directory
//!
//! Identity of tradable instruments and the read-only directory used to
//! resolve them. The feed only ever reports `(exchange, token)` pairs; the
//! directory turns those into full [`Instrument`] records.
//!
//! # Exchanges
//!
//! | Exchange  | Binary code | Price multiplier |
//! |-----------|-------------|------------------|
//! | `NSE`     | 1           | 100              |
//! | `NFO`     | 2           | 100              |
//! | `CDS`     | 3           | 10,000,000       |
//! | `MCX`     | 4           | 100              |
//! | `BSE`     | 6           | 100              |
//! | `BFO`     | 7           | 100              |
//! | `BCD`     | -           | 10,000,000       |
//!
//! # Contract Files
//!
//! Master contract files are JSON objects keyed by exchange code, each
//! holding an array of contract records:
//!
//! ```json
//! {"NSE": [{"token": "1594", "trading_symbol": "INFY-EQ", "symbol": "INFY"}]}
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building or querying the directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Exchange code is not recognised.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// Instrument key is not in `EXCHANGE|TOKEN` form.
    #[error("invalid instrument key: {0}")]
    InvalidKey(String),

    /// Contract file could not be read.
    #[error("failed to read contract file {path}: {source}")]
    Io {
        /// Path of the contract file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Contract file is not valid JSON.
    #[error("invalid contract JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Contract record is missing a required field or has a bad value.
    #[error("invalid contract record on {exchange}: {reason}")]
    InvalidContract {
        /// Exchange the record belongs to.
        exchange: Exchange,
        /// Description of the problem.
        reason: String,
    },
}

// =============================================================================
// Exchange
// =============================================================================

/// Exchange segment an instrument trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// NSE cash.
    Nse,
    /// NSE futures and options.
    Nfo,
    /// NSE currency derivatives.
    Cds,
    /// MCX commodities.
    Mcx,
    /// BSE cash.
    Bse,
    /// BSE futures and options.
    Bfo,
    /// BSE currency derivatives.
    Bcd,
    /// NSE commodities.
    Nco,
    /// BSE commodities.
    Bco,
    /// Index values.
    Indices,
}

impl Exchange {
    /// All known exchanges.
    pub const ALL: [Self; 10] = [
        Self::Nse,
        Self::Nfo,
        Self::Cds,
        Self::Mcx,
        Self::Bse,
        Self::Bfo,
        Self::Bcd,
        Self::Nco,
        Self::Bco,
        Self::Indices,
    ];

    /// Get the wire code of this exchange.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Nfo => "NFO",
            Self::Cds => "CDS",
            Self::Mcx => "MCX",
            Self::Bse => "BSE",
            Self::Bfo => "BFO",
            Self::Bcd => "BCD",
            Self::Nco => "NCO",
            Self::Bco => "BCO",
            Self::Indices => "INDICES",
        }
    }

    /// Numeric code used by the binary feed, if the exchange has one.
    #[must_use]
    pub const fn binary_code(&self) -> Option<u8> {
        match self {
            Self::Nse => Some(1),
            Self::Nfo => Some(2),
            Self::Cds => Some(3),
            Self::Mcx => Some(4),
            Self::Bse => Some(6),
            Self::Bfo => Some(7),
            Self::Bcd | Self::Nco | Self::Bco | Self::Indices => None,
        }
    }

    /// Resolve a binary feed exchange code.
    #[must_use]
    pub const fn from_binary_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Nse),
            2 => Some(Self::Nfo),
            3 => Some(Self::Cds),
            4 => Some(Self::Mcx),
            6 => Some(Self::Bse),
            7 => Some(Self::Bfo),
            _ => None,
        }
    }

    /// Divisor that turns integer wire prices into rupee values.
    #[must_use]
    pub const fn price_multiplier(&self) -> u32 {
        match self {
            Self::Cds | Self::Bcd => 10_000_000,
            _ => 100,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|exchange| exchange.as_str() == upper)
            .ok_or_else(|| DirectoryError::UnknownExchange(s.to_string()))
    }
}

// =============================================================================
// Instrument
// =============================================================================

/// Directory key of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentKey {
    /// Exchange segment.
    pub exchange: Exchange,
    /// Venue token, unique within the exchange.
    pub token: u32,
}

impl InstrumentKey {
    /// Create a new key.
    #[must_use]
    pub const fn new(exchange: Exchange, token: u32) -> Self {
        Self { exchange, token }
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.exchange, self.token)
    }
}

impl FromStr for InstrumentKey {
    type Err = DirectoryError;

    /// Parse the `EXCHANGE|TOKEN` form used on the wire.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, token) = s
            .trim()
            .split_once('|')
            .ok_or_else(|| DirectoryError::InvalidKey(s.to_string()))?;
        let exchange: Exchange = exchange.parse()?;
        let token = token
            .trim()
            .parse()
            .map_err(|_| DirectoryError::InvalidKey(s.to_string()))?;
        Ok(Self { exchange, token })
    }
}

/// A tradable instrument.
///
/// Two instruments are equal when their exchange and token match; the
/// descriptive fields do not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange segment.
    pub exchange: Exchange,
    /// Venue token.
    pub token: u32,
    /// Trading symbol, e.g. `INFY-EQ`.
    pub symbol: String,
    /// Display name.
    pub name: Option<String>,
    /// Contract expiry for derivatives.
    pub expiry: Option<NaiveDate>,
    /// Contract lot size.
    pub lot_size: Option<u32>,
}

impl Instrument {
    /// Create an instrument with only the identifying fields.
    #[must_use]
    pub fn new(exchange: Exchange, token: u32, symbol: impl Into<String>) -> Self {
        Self {
            exchange,
            token,
            symbol: symbol.into(),
            name: None,
            expiry: None,
            lot_size: None,
        }
    }

    /// Get the directory key.
    #[must_use]
    pub const fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.exchange, self.token)
    }
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Instrument {}

impl Hash for Instrument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.exchange, self.symbol, self.token)
    }
}

// =============================================================================
// Resolver Port
// =============================================================================

/// Lookup of instruments by exchange and token.
///
/// Decoders resolve every quote frame through this trait.
#[cfg_attr(test, mockall::automock)]
pub trait InstrumentResolver: Send + Sync {
    /// Resolve an instrument, returning `None` when it is unknown.
    fn resolve(&self, exchange: Exchange, token: u32) -> Option<Arc<Instrument>>;
}

// =============================================================================
// Directory
// =============================================================================

#[derive(Debug, Deserialize)]
struct ContractRecord {
    token: serde_json::Value,
    #[serde(default)]
    trading_symbol: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    formatted_ins_name: Option<String>,
    #[serde(default)]
    expiry_date: Option<i64>,
    #[serde(default)]
    lot_size: Option<serde_json::Value>,
}

/// In-memory instrument directory.
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct InstrumentDirectory {
    by_key: HashMap<InstrumentKey, Arc<Instrument>>,
    by_symbol: HashMap<(Exchange, String), Arc<Instrument>>,
}

impl InstrumentDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instrument, replacing any previous entry with the same key.
    pub fn insert(&mut self, instrument: Instrument) -> Arc<Instrument> {
        let instrument = Arc::new(instrument);
        if let Some(previous) = self.by_key.insert(instrument.key(), Arc::clone(&instrument)) {
            self.by_symbol
                .remove(&(previous.exchange, previous.symbol.to_ascii_uppercase()));
        }
        self.by_symbol.insert(
            (instrument.exchange, instrument.symbol.to_ascii_uppercase()),
            Arc::clone(&instrument),
        );
        instrument
    }

    /// Look up an instrument by exchange and token.
    #[must_use]
    pub fn by_token(&self, exchange: Exchange, token: u32) -> Option<Arc<Instrument>> {
        self.by_key.get(&InstrumentKey::new(exchange, token)).cloned()
    }

    /// Look up an instrument by exchange and trading symbol (case-insensitive).
    #[must_use]
    pub fn by_symbol(&self, exchange: Exchange, symbol: &str) -> Option<Arc<Instrument>> {
        self.by_symbol
            .get(&(exchange, symbol.trim().to_ascii_uppercase()))
            .cloned()
    }

    /// Search an exchange for instruments matching any of `queries`.
    ///
    /// A query matches when it is a case-insensitive substring of the first
    /// space-delimited word of the trading symbol, so `inf` finds `INFY-EQ`
    /// and `INFY26OCTFUT`. Blank queries match nothing. Results are ordered
    /// by token and each instrument appears once.
    #[must_use]
    pub fn search<S: AsRef<str>>(
        &self,
        exchange: Exchange,
        queries: &[S],
    ) -> Vec<Arc<Instrument>> {
        let queries: Vec<String> = queries
            .iter()
            .map(|query| query.as_ref().trim().to_lowercase())
            .filter(|query| !query.is_empty())
            .collect();
        if queries.is_empty() {
            return Vec::new();
        }
        let mut found: Vec<_> = self
            .by_key
            .values()
            .filter(|instrument| instrument.exchange == exchange)
            .filter(|instrument| {
                let root = instrument
                    .symbol
                    .split(' ')
                    .next()
                    .unwrap_or_default()
                    .to_lowercase();
                queries.iter().any(|query| root.contains(query.as_str()))
            })
            .cloned()
            .collect();
        found.sort_by_key(|instrument| instrument.token);
        found
    }

    /// Find a derivative contract by underlying, expiry and kind.
    ///
    /// Candidates come from [`search`](Self::search) on `underlying` and must
    /// have a display name whose first word is the underlying and the given
    /// expiry. Futures are recognised by `FUT` in the trading symbol; options
    /// by a name ending in `<strike> CE` or `<strike> PE`.
    #[must_use]
    pub fn derivative(
        &self,
        exchange: Exchange,
        underlying: &str,
        expiry: NaiveDate,
        kind: DerivativeKind,
    ) -> Option<Arc<Instrument>> {
        let underlying = underlying.trim();
        self.search(exchange, &[underlying])
            .into_iter()
            .filter(|instrument| instrument.expiry == Some(expiry))
            .find(|instrument| {
                let Some(name) = instrument.name.as_deref() else {
                    return false;
                };
                let words: Vec<&str> = name.split(' ').collect();
                if !words
                    .first()
                    .is_some_and(|root| root.eq_ignore_ascii_case(underlying))
                {
                    return false;
                }
                match kind {
                    DerivativeKind::Future => instrument.symbol.contains("FUT"),
                    DerivativeKind::Call(strike) => option_matches(&words, "CE", strike),
                    DerivativeKind::Put(strike) => option_matches(&words, "PE", strike),
                }
            })
    }

    /// Number of instruments in the directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Check if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Load every instrument from a master contract JSON document.
    ///
    /// Returns the number of instruments added. Unknown exchange keys are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON or a record has
    /// no usable token.
    pub fn load_contract_json(&mut self, json: &str) -> Result<usize, DirectoryError> {
        let document: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut added = 0;

        for (segment, records) in document {
            let Ok(exchange) = segment.parse::<Exchange>() else {
                tracing::debug!(segment = %segment, "Skipping unknown contract segment");
                continue;
            };
            let records: Vec<ContractRecord> = serde_json::from_value(records)?;
            for record in records {
                let instrument = Self::instrument_from_record(exchange, record)?;
                self.insert(instrument);
                added += 1;
            }
        }

        Ok(added)
    }

    /// Load a master contract file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_contract_file(&mut self, path: &Path) -> Result<usize, DirectoryError> {
        let json = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let added = self.load_contract_json(&json)?;
        tracing::info!(path = %path.display(), instruments = added, "Loaded contract file");
        Ok(added)
    }

    fn instrument_from_record(
        exchange: Exchange,
        record: ContractRecord,
    ) -> Result<Instrument, DirectoryError> {
        let token = json_u32(&record.token).ok_or_else(|| DirectoryError::InvalidContract {
            exchange,
            reason: format!("invalid token {}", record.token),
        })?;
        let symbol = record
            .trading_symbol
            .or(record.symbol)
            .ok_or_else(|| DirectoryError::InvalidContract {
                exchange,
                reason: format!("token {token} has no symbol"),
            })?;
        let expiry = record
            .expiry_date
            .and_then(DateTime::from_timestamp_millis)
            .map(|expiry| expiry.date_naive());

        Ok(Instrument {
            exchange,
            token,
            symbol,
            name: record.formatted_ins_name,
            expiry,
            lot_size: record.lot_size.as_ref().and_then(json_u32),
        })
    }
}

/// Kind of derivative contract for [`InstrumentDirectory::derivative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeKind {
    /// Futures contract.
    Future,
    /// Call option at a strike.
    Call(Decimal),
    /// Put option at a strike.
    Put(Decimal),
}

/// Option names end in `<strike> CE|PE`.
fn option_matches(words: &[&str], side: &str, strike: Decimal) -> bool {
    match words {
        [.., name_strike, name_side] if *name_side == side => name_strike
            .parse::<Decimal>()
            .is_ok_and(|name_strike| name_strike == strike),
        _ => false,
    }
}

impl InstrumentResolver for InstrumentDirectory {
    fn resolve(&self, exchange: Exchange, token: u32) -> Option<Arc<Instrument>> {
        self.by_token(exchange, token)
    }
}

fn json_u32(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
