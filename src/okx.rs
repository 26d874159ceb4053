// ===============================
// src/okx.rs
// ===============================
// Helper (signer/types) untuk OKX REST.
use std::collections::HashSet;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer};
use sha2::Sha256;

use crate::domain::RawPosition;

pub const SUBPOSITIONS_PATH: &str = "/api/v5/copytrading/public-current-subpositions";
pub const BALANCE_PATH: &str = "/api/v5/account/balance";
pub const LEAD_TRADERS_PATH: &str = "/api/v5/copytrading/public-lead-traders";

/// Sort orders the lead-trader ranking accepts.
pub const LEAD_TRADER_SORTS: [&str; 2] = ["pnl", "aum"];
/// Ranking page size cap on OKX.
pub const LEAD_TRADER_PAGE_SIZE: usize = 20;
pub const LEAD_TRADER_MAX_PAGES: usize = 5;

/// `2024-01-02T03:04:05.678Z`, the format OKX expects in OK-ACCESS-TIMESTAMP.
pub fn timestamp_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// base64(HMAC-SHA256(timestamp + METHOD + requestPath + body))
pub fn sign_request(secret: &str, timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    // HMAC menerima key dengan panjang berapa pun
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key");
    mac.update(timestamp.as_bytes());
    mac.update(method.to_ascii_uppercase().as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    base64::encode(mac.finalize().into_bytes())
}

pub fn query_string(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// --- Model minimal untuk response REST ---

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubPosition {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub inst_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub pos_side: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub sub_pos: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub pos: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub open_avg_px: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub avg_px: Option<String>,
}

impl From<SubPosition> for RawPosition {
    fn from(p: SubPosition) -> Self {
        RawPosition {
            instrument: p.inst_id.unwrap_or_default(),
            side: p.pos_side.unwrap_or_default(),
            size: p.sub_pos.or(p.pos).unwrap_or_else(|| "0".to_string()),
            avg_price: p.open_avg_px.or(p.avg_px).unwrap_or_else(|| "0".to_string()),
        }
    }
}

/// One row of the public lead-trader ranking.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadTrader {
    #[serde(default, deserialize_with = "lenient_string")]
    pub unique_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nick_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pnl: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pnl_ratio: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub win_ratio: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub aum: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    copy_trader_num: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    acc_copy_trader_num: Option<String>,
}

impl LeadTrader {
    pub fn copiers(&self) -> &str {
        [&self.copy_trader_num, &self.acc_copy_trader_num]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("0")
    }
}

/// `data[0]` of a ranking response.
#[derive(Debug, Default, Deserialize)]
pub struct LeadTraderPage {
    #[serde(default)]
    pub ranks: Vec<LeadTrader>,
}

/// Append the rows whose code has not been seen yet; returns how many were new.
pub fn merge_new_traders(seen: &mut HashSet<String>, ranks: Vec<LeadTrader>, out: &mut Vec<LeadTrader>) -> usize {
    let mut added = 0;
    for t in ranks {
        if !t.unique_code.is_empty() && seen.insert(t.unique_code.clone()) {
            out.push(t);
            added += 1;
        }
    }
    added
}

fn value_to_string(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// Angka bisa datang sebagai string ("1.5") atau number (1.5)
fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_string(serde_json::Value::deserialize(d)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_string(serde_json::Value::deserialize(d)?).unwrap_or_default())
}

/// Pull a trader unique code out of user input: a bare code, a profile URL
/// (`.../account/CODE`) or a query (`uniqueCode=CODE`).
pub fn extract_unique_code(text: &str) -> Option<String> {
    let text = text.trim();
    let take_code = |rest: &str| -> Option<String> {
        let code: String = rest.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
        (!code.is_empty()).then_some(code)
    };

    if let Some(idx) = text.find("account/") {
        if let Some(code) = take_code(&text[idx + "account/".len()..]) {
            return Some(code);
        }
    }
    if let Some(idx) = text.find("uniqueCode=") {
        if let Some(code) = take_code(&text[idx + "uniqueCode=".len()..]) {
            return Some(code);
        }
    }
    let len = text.chars().count();
    if (12..=20).contains(&len) && text.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(text.to_string());
    }
    None
}

/// Share links (`https://oyidl.net/...`) only reveal the code after the
/// redirect is followed. Returns the link itself when `text` contains one.
pub fn short_link(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    if !lower.contains("oyidl") {
        return None;
    }
    let start = lower.find("http")?;
    let link = text[start..].split_whitespace().next()?;
    Some(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_accepts_string_and_numeric_fields() {
        let body = r#"{"code":"0","msg":"","data":[
            {"instId":"BTC-USDT-SWAP","posSide":"long","subPos":"12.5","openAvgPx":"64000.1"},
            {"instId":"ETH-USDT-SWAP","posSide":"short","pos":3,"avgPx":2500}
        ]}"#;
        let env: Envelope<SubPosition> = serde_json::from_str(body).unwrap();
        assert_eq!(env.code, "0");
        let rows: Vec<RawPosition> = env.data.into_iter().map(RawPosition::from).collect();
        assert_eq!(rows[0].size, "12.5");
        assert_eq!(rows[0].avg_price, "64000.1");
        assert_eq!(rows[1].side, "short");
        assert_eq!(rows[1].size, "3");
        assert_eq!(rows[1].avg_price, "2500");
    }

    #[test]
    fn numeric_code_and_missing_data() {
        let env: Envelope<SubPosition> = serde_json::from_str(r#"{"code":51000,"msg":"bad"}"#).unwrap();
        assert_eq!(env.code, "51000");
        assert!(env.data.is_empty());
    }

    #[test]
    fn sub_pos_takes_precedence_over_pos() {
        let p: SubPosition = serde_json::from_str(r#"{"instId":"X","posSide":"long","subPos":"1","pos":"9"}"#).unwrap();
        assert_eq!(RawPosition::from(p).size, "1");
    }

    #[test]
    fn signature_is_stable_base64() {
        let a = sign_request("secret", "2024-01-01T00:00:00.000Z", "get", BALANCE_PATH, "");
        let b = sign_request("secret", "2024-01-01T00:00:00.000Z", "GET", BALANCE_PATH, "");
        assert_eq!(a, b);
        // HMAC-SHA256 -> 32 bytes -> 44 base64 chars
        assert_eq!(a.len(), 44);
        assert_ne!(a, sign_request("other", "2024-01-01T00:00:00.000Z", "GET", BALANCE_PATH, ""));
    }

    #[test]
    fn timestamp_has_millis_and_zulu() {
        let ts = timestamp_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn extracts_codes_from_various_inputs() {
        assert_eq!(extract_unique_code("90BCC01689ED93F0").as_deref(), Some("90BCC01689ED93F0"));
        assert_eq!(
            extract_unique_code("https://www.okx.com/copy-trading/account/C7966D1C938416B0?tab=swap").as_deref(),
            Some("C7966D1C938416B0")
        );
        assert_eq!(extract_unique_code("foo?uniqueCode=ABCDEF123456&x=1").as_deref(), Some("ABCDEF123456"));
        assert_eq!(extract_unique_code("short"), None);
        assert_eq!(extract_unique_code("has spaces in it!!"), None);
    }

    #[test]
    fn share_links_are_recognised() {
        assert_eq!(short_link("https://oyidl.net/ul/AbC123"), Some("https://oyidl.net/ul/AbC123"));
        assert_eq!(short_link("look: HTTPS://OYIDL.NET/ul/x  thanks"), Some("HTTPS://OYIDL.NET/ul/x"));
        assert_eq!(short_link("https://www.okx.com/copy-trading/account/C7966D1C938416B0"), None);
        assert_eq!(short_link("oyidl without a link"), None);
    }

    #[test]
    fn ranking_rows_parse_and_dedupe() {
        let body = r#"{"code":"0","msg":"","data":[{"ranks":[
            {"uniqueCode":"AAAA1111BBBB2222","nickName":"alpha","pnl":"1200.5","winRatio":"0.61","copyTraderNum":"35"},
            {"uniqueCode":"CCCC3333DDDD4444","nickName":"beta","pnl":-3,"accCopyTraderNum":7},
            {"uniqueCode":"","nickName":"nobody"}
        ]}]}"#;
        let env: Envelope<LeadTraderPage> = serde_json::from_str(body).unwrap();
        let ranks = env.data.into_iter().next().unwrap().ranks;
        assert_eq!(ranks[1].pnl, "-3");
        assert_eq!(ranks[0].copiers(), "35");
        assert_eq!(ranks[1].copiers(), "7");

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        assert_eq!(merge_new_traders(&mut seen, ranks.clone(), &mut out), 2);
        // same page again brings nothing new
        assert_eq!(merge_new_traders(&mut seen, ranks, &mut out), 0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].nick_name, "alpha");
    }

    #[test]
    fn query_is_url_encoded() {
        assert_eq!(query_string(&[("instType", "SWAP"), ("uniqueCode", "A B")]), "instType=SWAP&uniqueCode=A%20B");
    }
}
