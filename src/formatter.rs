// ===============================
// src/formatter.rs
// ===============================
//
// TradeSignal -> teks notifikasi.
//
// Marker (emoji + Tone) adalah bagian dari kontrak output: konsumen downstream
// boleh branch berdasarkan tone, jadi jangan diubah sembarangan.
//

use chrono::Local;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{Side, TradeAction, TradeSignal};

pub const PLACEHOLDER: &str = "-";
pub const UNKNOWN_COIN: &str = "unknown";

/// Suffixes stripped from an instrument id to get the coin, first match wins.
const MARKET_SUFFIXES: [&str; 4] = ["-USDT-SWAP", "-USDC-SWAP", "-USD-SWAP", "-SWAP"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone { Green, Red, Cyan, Orange }

impl Tone {
    pub fn class_name(&self) -> &'static str {
        match self {
            Tone::Green => "accent_green",
            Tone::Red => "accent_red",
            Tone::Cyan => "accent_cyan",
            Tone::Orange => "accent_orange",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Tone::Green => "🟢",
            Tone::Red => "🔴",
            Tone::Cyan => "🔵",
            Tone::Orange => "🟠",
        }
    }
}

pub fn action_label(action: TradeAction) -> &'static str {
    match action {
        TradeAction::OpenLong => "Open Long",
        TradeAction::OpenShort => "Open Short",
        TradeAction::CloseLong => "Close Long",
        TradeAction::CloseShort => "Close Short",
        TradeAction::AddLong => "Add Long",
        TradeAction::AddShort => "Add Short",
        TradeAction::ReduceLong => "Reduce Long",
        TradeAction::ReduceShort => "Reduce Short",
    }
}

pub fn action_tone(action: TradeAction) -> Tone {
    match action {
        TradeAction::OpenLong | TradeAction::AddLong => Tone::Green,
        TradeAction::OpenShort | TradeAction::AddShort => Tone::Red,
        TradeAction::CloseLong | TradeAction::ReduceLong => Tone::Cyan,
        TradeAction::CloseShort | TradeAction::ReduceShort => Tone::Orange,
    }
}

pub fn direction_label(side: Side) -> &'static str {
    match side {
        Side::Long => "Long",
        Side::Short => "Short",
    }
}

pub fn coin_symbol(instrument: &str) -> String {
    let inst = instrument.trim();
    if inst.is_empty() {
        return UNKNOWN_COIN.to_string();
    }
    MARKET_SUFFIXES
        .iter()
        .find_map(|sfx| inst.strip_suffix(sfx))
        .unwrap_or(inst)
        .to_string()
}

/// `1234567.891` -> `1,234,567.89`
pub fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

/// Boundary variant for untrusted text: anything that is not a number gives "-".
pub fn format_amount_str(raw: &str) -> String {
    crate::domain::parse_decimal(raw).map(format_amount).unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn amount_or_placeholder(value: Option<Decimal>) -> String {
    value.map(format_amount).unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn price_or_placeholder(value: Option<Decimal>) -> String {
    value.map(|v| format!("${}", format_amount(v))).unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn format(signal: &TradeSignal) -> String {
    let tone = action_tone(signal.action);
    let coin = coin_symbol(&signal.instrument);
    let instrument = if signal.instrument.trim().is_empty() { UNKNOWN_COIN } else { signal.instrument.as_str() };
    let ts = signal.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");

    let mut msg = format!(
        "🔔 Trader activity\n\n\
         Trader: {}\n\
         Action: {} {}\n\
         Instrument: {}\n\
         Direction: {}\n\
         Quantity: {} {}\n\
         Price: {}\n",
        signal.trader_display_name,
        tone.marker(),
        action_label(signal.action),
        instrument,
        direction_label(signal.side),
        amount_or_placeholder(signal.quantity),
        coin,
        price_or_placeholder(signal.price),
    );
    if !matches!(signal.action, TradeAction::OpenLong | TradeAction::OpenShort) {
        msg.push_str(&format!("Previous: {} {}\n", amount_or_placeholder(signal.previous_quantity), coin));
    }
    msg.push_str(&format!("\nTime: {ts}"));
    msg
}

/// One-liner for logs and the console.
pub fn format_line(signal: &TradeSignal) -> String {
    format!(
        "[{}] {} {} | qty {}",
        signal.trader_display_name,
        action_label(signal.action),
        coin_symbol(&signal.instrument),
        amount_or_placeholder(signal.quantity),
    )
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn signal(action: TradeAction, instrument: &str) -> TradeSignal {
        TradeSignal {
            trader_code: "90BCC01689ED93F0".into(),
            trader_display_name: "whale".into(),
            action,
            instrument: instrument.into(),
            side: Side::Long,
            quantity: Some(d("5")),
            price: Some(d("64000.5")),
            previous_quantity: Some(d("10")),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
        }
    }

    #[test]
    fn coin_strips_known_suffixes() {
        assert_eq!(coin_symbol("BTC-USDT-SWAP"), "BTC");
        assert_eq!(coin_symbol("ETH-USD-SWAP"), "ETH");
        assert_eq!(coin_symbol("SOL-SWAP"), "SOL");
        assert_eq!(coin_symbol("DOGE-USDT"), "DOGE-USDT");
        assert_eq!(coin_symbol(""), UNKNOWN_COIN);
    }

    #[test]
    fn every_action_has_a_distinct_label_and_a_tone() {
        use TradeAction::*;
        let all = [OpenLong, OpenShort, CloseLong, CloseShort, AddLong, AddShort, ReduceLong, ReduceShort];
        let mut labels: Vec<&str> = all.iter().map(|a| action_label(*a)).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 8);
        assert_eq!(action_tone(OpenLong).class_name(), "accent_green");
        assert_eq!(action_tone(AddShort).class_name(), "accent_red");
        assert_eq!(action_tone(ReduceLong).class_name(), "accent_cyan");
        assert_eq!(action_tone(CloseShort).class_name(), "accent_orange");
    }

    #[test]
    fn amounts_are_grouped_fixed_point() {
        assert_eq!(format_amount(d("1234567.891")), "1,234,567.89");
        assert_eq!(format_amount(d("0.005")), "0.01");
        assert_eq!(format_amount(d("999")), "999.00");
        assert_eq!(format_amount(d("-1000")), "-1,000.00");
        assert_eq!(format_amount_str("12.3"), "12.30");
        assert_eq!(format_amount_str("abc"), PLACEHOLDER);
        assert_eq!(format_amount_str(""), PLACEHOLDER);
    }

    #[test]
    fn message_carries_all_fields() {
        let msg = format(&signal(TradeAction::AddLong, "BTC-USDT-SWAP"));
        assert!(msg.contains("Trader: whale"));
        assert!(msg.contains("Action: 🟢 Add Long"));
        assert!(msg.contains("Instrument: BTC-USDT-SWAP"));
        assert!(msg.contains("Direction: Long"));
        assert!(msg.contains("Quantity: 5.00 BTC"));
        assert!(msg.contains("Price: $64,000.50"));
        assert!(msg.contains("Previous: 10.00 BTC"));
        let local = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap().with_timezone(&Local);
        assert!(msg.contains(&local.format("%Y-%m-%d %H:%M:%S").to_string()));
    }

    #[test]
    fn open_has_no_previous_line() {
        let msg = format(&signal(TradeAction::OpenLong, "BTC-USDT-SWAP"));
        assert!(!msg.contains("Previous:"));
    }

    #[test]
    fn missing_numbers_and_instrument_degrade() {
        let mut s = signal(TradeAction::CloseLong, "");
        s.quantity = None;
        s.price = None;
        let msg = format(&s);
        assert!(msg.contains("Instrument: unknown"));
        assert!(msg.contains("Quantity: - unknown"));
        assert!(msg.contains("Price: -"));
    }

    #[test]
    fn line_summary() {
        assert_eq!(format_line(&signal(TradeAction::ReduceLong, "ETH-USDT-SWAP")), "[whale] Reduce Long ETH | qty 5.00");
    }
}
