// ===============================
// src/domain.rs
// ===============================
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side { Long, Short }
impl Side {
    pub fn as_str(&self) -> &'static str { match self { Side::Long => "long", Side::Short => "short" } }
}

/// Identity of a position slot across polls: same instrument, same side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey { pub instrument: String, pub side: Side }

/// One position row as the fetch collaborator hands it over. Numbers are kept
/// as received; parsing happens when the snapshot set is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPosition { pub instrument: String, pub side: String, pub size: String, pub avg_price: String }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub instrument: String,
    pub side: Side,
    /// `None` when the wire value was not a number.
    pub size: Option<Decimal>,
    pub avg_price: Option<Decimal>,
}

impl PositionSnapshot {
    pub fn key(&self) -> PositionKey {
        PositionKey { instrument: self.instrument.clone(), side: self.side }
    }
}

/// Parse a decimal the way the exchange sends it: plain ("0.5"), scientific
/// ("5e-1") or empty. Empty and garbage both give `None`.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)).ok()
}

impl RawPosition {
    /// Normalise one wire row into a snapshot. `net` rows take their side from
    /// the sign of the size. Unknown sides are dropped.
    pub fn to_snapshot(&self) -> Option<PositionSnapshot> {
        let size = parse_decimal(&self.size);
        let avg_price = parse_decimal(&self.avg_price);
        let (side, size) = match self.side.trim().to_ascii_lowercase().as_str() {
            "long" => (Side::Long, size),
            "short" => (Side::Short, size),
            "net" => match size {
                Some(s) if s.is_sign_negative() => (Side::Short, Some(s.abs())),
                other => (Side::Long, other),
            },
            other => {
                warn!(instrument = %self.instrument, side = %other, "unknown position side, row dropped");
                return None;
            }
        };
        let size = size.map(|s| {
            debug_assert!(!s.is_sign_negative() || s.is_zero(), "negative size on {} {}", self.instrument, self.side);
            s.max(Decimal::ZERO)
        });
        Some(PositionSnapshot { instrument: self.instrument.clone(), side, size, avg_price })
    }
}

/// A trader's whole position book at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSet {
    positions: BTreeMap<PositionKey, PositionSnapshot>,
}

impl SnapshotSet {
    pub fn new() -> Self { Self::default() }

    pub fn from_raw(rows: &[RawPosition]) -> Self {
        let mut set = Self::new();
        for snap in rows.iter().filter_map(RawPosition::to_snapshot) {
            set.insert(snap);
        }
        set
    }

    /// Last write wins on a repeated key (asserts in debug builds).
    pub fn insert(&mut self, snap: PositionSnapshot) {
        let key = snap.key();
        if self.positions.insert(key.clone(), snap).is_some() {
            warn!(instrument = %key.instrument, side = key.side.as_str(), "duplicate position key in one snapshot, keeping last");
            debug_assert!(false, "duplicate position key {} {}", key.instrument, key.side.as_str());
        }
    }

    pub fn get(&self, key: &PositionKey) -> Option<&PositionSnapshot> { self.positions.get(key) }
    pub fn keys(&self) -> impl Iterator<Item = &PositionKey> { self.positions.keys() }
    pub fn iter(&self) -> impl Iterator<Item = &PositionSnapshot> { self.positions.values() }
    pub fn len(&self) -> usize { self.positions.len() }
    pub fn is_empty(&self) -> bool { self.positions.is_empty() }
}

impl FromIterator<PositionSnapshot> for SnapshotSet {
    fn from_iter<T: IntoIterator<Item = PositionSnapshot>>(iter: T) -> Self {
        let mut set = Self::new();
        for snap in iter {
            set.insert(snap);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderRecord { pub code: String, pub display_name: String }

impl TraderRecord {
    pub fn new(code: impl Into<String>, display_name: Option<&str>) -> Self {
        let code = code.into();
        let display_name = match display_name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => default_display_name(&code),
        };
        Self { code, display_name }
    }
}

/// "Trader-" + first 8 chars of the code.
pub fn default_display_name(code: &str) -> String {
    let short: String = code.chars().take(8).collect();
    format!("Trader-{short}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction { OpenLong, OpenShort, CloseLong, CloseShort, AddLong, AddShort, ReduceLong, ReduceShort }

impl TradeAction {
    pub fn open(side: Side) -> Self { match side { Side::Long => Self::OpenLong, Side::Short => Self::OpenShort } }
    pub fn close(side: Side) -> Self { match side { Side::Long => Self::CloseLong, Side::Short => Self::CloseShort } }
    pub fn add(side: Side) -> Self { match side { Side::Long => Self::AddLong, Side::Short => Self::AddShort } }
    pub fn reduce(side: Side) -> Self { match side { Side::Long => Self::ReduceLong, Side::Short => Self::ReduceShort } }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenLong => "open_long",
            Self::OpenShort => "open_short",
            Self::CloseLong => "close_long",
            Self::CloseShort => "close_short",
            Self::AddLong => "add_long",
            Self::AddShort => "add_short",
            Self::ReduceLong => "reduce_long",
            Self::ReduceShort => "reduce_short",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub trader_code: String,
    pub trader_display_name: String,
    pub action: TradeAction,
    pub instrument: String,
    pub side: Side,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub previous_quantity: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState { Stopped, Running, Stopping }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    Log(String),
    Error { trader_code: Option<String>, message: String },
    Signal(TradeSignal),
    PositionsRefreshed { trader_code: String, positions: Vec<PositionSnapshot>, timestamp: DateTime<Utc> },
    SchedulerState(SchedulerState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryChange {
    Added(TraderRecord),
    Removed(String),
    Renamed(TraderRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(inst: &str, side: &str, size: &str, px: &str) -> RawPosition {
        RawPosition { instrument: inst.into(), side: side.into(), size: size.into(), avg_price: px.into() }
    }

    #[test]
    fn parses_plain_and_scientific_decimals() {
        assert_eq!(parse_decimal("1.5"), Some(Decimal::new(15, 1)));
        assert_eq!(parse_decimal(" 2 "), Some(Decimal::new(2, 0)));
        assert_eq!(parse_decimal("5e-1"), Some(Decimal::new(5, 1)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn net_side_follows_size_sign() {
        let short = raw("BTC-USDT-SWAP", "net", "-3", "100").to_snapshot().unwrap();
        assert_eq!(short.side, Side::Short);
        assert_eq!(short.size, Some(Decimal::new(3, 0)));

        let long = raw("BTC-USDT-SWAP", "net", "3", "100").to_snapshot().unwrap();
        assert_eq!(long.side, Side::Long);
    }

    #[test]
    fn unknown_side_is_dropped() {
        assert!(raw("BTC-USDT-SWAP", "sideways", "1", "1").to_snapshot().is_none());
    }

    #[test]
    fn garbage_numbers_become_none() {
        let snap = raw("ETH-USDT-SWAP", "long", "n/a", "").to_snapshot().unwrap();
        assert_eq!(snap.size, None);
        assert_eq!(snap.avg_price, None);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn duplicate_keys_keep_last_row() {
        let set = SnapshotSet::from_raw(&[
            raw("BTC-USDT-SWAP", "long", "1", "100"),
            raw("BTC-USDT-SWAP", "long", "2", "110"),
            raw("BTC-USDT-SWAP", "short", "4", "120"),
        ]);
        assert_eq!(set.len(), 2);
        let key = PositionKey { instrument: "BTC-USDT-SWAP".into(), side: Side::Long };
        assert_eq!(set.get(&key).unwrap().size, Some(Decimal::new(2, 0)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "duplicate position key")]
    fn duplicate_keys_assert_in_debug() {
        SnapshotSet::from_raw(&[raw("BTC-USDT-SWAP", "long", "1", "100"), raw("BTC-USDT-SWAP", "long", "2", "110")]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "negative size")]
    fn negative_size_asserts_in_debug() {
        raw("BTC-USDT-SWAP", "long", "-1", "100").to_snapshot();
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn negative_size_is_clamped() {
        let snap = raw("BTC-USDT-SWAP", "long", "-1", "100").to_snapshot().unwrap();
        assert_eq!(snap.size, Some(Decimal::ZERO));
    }

    #[test]
    fn display_name_falls_back_to_code_prefix() {
        assert_eq!(TraderRecord::new("90BCC01689ED93F0", None).display_name, "Trader-90BCC016");
        assert_eq!(TraderRecord::new("90BCC01689ED93F0", Some("  ")).display_name, "Trader-90BCC016");
        assert_eq!(TraderRecord::new("90BCC01689ED93F0", Some("whale")).display_name, "whale");
    }
}
