// ===============================
// src/diff.rs
// ===============================
//
// Diff engine: dua snapshot berturut-turut -> daftar TradeSignal.
//
// - key baru                 -> OPEN_*   (qty = size baru)
// - key hilang               -> CLOSE_*  (qty = prev = size lama)
// - key sama, |delta| > tol  -> ADD_* / REDUCE_* (qty = |delta|, prev = size lama)
//
// Fungsi ini pure. Supresi first-poll adalah tanggung jawab scheduler.
//

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{PositionKey, PositionSnapshot, SnapshotSet, TradeAction, TradeSignal, TraderRecord};

/// Absolute size tolerance below which a change is treated as float noise.
pub fn size_tolerance() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

pub fn diff(
    trader: &TraderRecord,
    old: &SnapshotSet,
    new: &SnapshotSet,
    timestamp: DateTime<Utc>,
) -> Vec<TradeSignal> {
    let all_keys: BTreeSet<&PositionKey> = old.keys().chain(new.keys()).collect();
    let tol = size_tolerance();

    let signal = |action: TradeAction, snap: &PositionSnapshot, quantity: Option<Decimal>, previous_quantity: Option<Decimal>| TradeSignal {
        trader_code: trader.code.clone(),
        trader_display_name: trader.display_name.clone(),
        action,
        instrument: snap.instrument.clone(),
        side: snap.side,
        quantity,
        price: snap.avg_price,
        previous_quantity,
        timestamp,
    };

    let mut out = Vec::new();
    for key in all_keys {
        match (old.get(key), new.get(key)) {
            (None, Some(n)) => {
                out.push(signal(TradeAction::open(n.side), n, n.size, Some(Decimal::ZERO)));
            }
            (Some(o), None) => {
                out.push(signal(TradeAction::close(o.side), o, o.size, o.size));
            }
            (Some(o), Some(n)) => {
                // size tak terbaca di salah satu sisi -> anggap tidak berubah
                let (Some(old_size), Some(new_size)) = (o.size, n.size) else { continue };
                let delta = new_size - old_size;
                if delta.abs() <= tol {
                    continue;
                }
                let action = if delta > Decimal::ZERO { TradeAction::add(n.side) } else { TradeAction::reduce(n.side) };
                out.push(signal(action, n, Some(delta.abs()), Some(old_size)));
            }
            (None, None) => {}
        }
    }
    out
}
