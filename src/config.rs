// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : copytrade_watch: async copy-trading position monitor in Rust
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Polls lead traders' public positions (OKX), diffs successive
          snapshots into open/close/add/reduce signals, notifies via
          Telegram, exposes Prometheus metrics, and records JSONL events.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;
use tracing::warn;

use crate::okx::{extract_unique_code, short_link};
use crate::okx_client::Credentials;

pub const DEFAULT_OKX_BASE_URL: &str = "https://www.okx.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid trader entry {0:?} (expected CODE, CODE:NAME or a profile URL)")]
    InvalidTrader(String),
}

/// Flag CLI; semua opsional, menimpa nilai dari env.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "copytrade_watch", version, about = "Copy-trading position monitor")]
pub struct Cli {
    /// Poll interval in seconds (min 1)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Trader to track, CODE or CODE:NAME or profile URL (repeatable)
    #[arg(long = "trader", value_name = "CODE[:NAME]")]
    pub traders: Vec<String>,

    #[arg(long)]
    pub traders_file: Option<PathBuf>,

    #[arg(long)]
    pub record_file: Option<String>,

    /// 0 disables the metrics endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Do not read admin commands from stdin
    #[arg(long)]
    pub no_console: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub poll_interval: Duration,
    /// (code, nickname) dari env TRADERS lalu --trader, urutan dipertahankan.
    /// Share link (oyidl) disimpan apa adanya, di-resolve saat startup.
    pub traders: Vec<(String, Option<String>)>,
    pub traders_file: Option<PathBuf>,

    // OKX
    pub okx_base_url: String,
    pub okx_inst_type: String,
    pub okx_credentials: Option<Credentials>,
    pub http_timeout: Duration,

    // Telegram
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_mirror: bool,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,
    pub event_buffer: usize,

    pub console: bool,
}

impl Config {
    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }
}

pub fn load() -> Result<Config, ConfigError> {
    // .env boleh tidak ada
    let _ = dotenv();
    let cli = Cli::parse();
    from_sources(|key| env::var(key).ok(), cli)
}

/// Build the config from an env lookup plus parsed flags. Flags win.
pub fn from_sources(lookup: impl Fn(&str) -> Option<String>, cli: Cli) -> Result<Config, ConfigError> {
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let interval_secs = cli.interval.unwrap_or_else(|| number(&var, "POLL_INTERVAL_SECS", 10u64));
    let interval_secs = if interval_secs < 1 {
        warn!(interval_secs, "poll interval below 1s, using 1s");
        1
    } else {
        interval_secs
    };

    // ===== Traders =====
    // TRADERS=C7966D1C938416B0:eth maxi,90BCC01689ED93F0
    let mut traders = Vec::new();
    if let Some(list) = var("TRADERS") {
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            traders.push(parse_trader_entry(entry)?);
        }
    }
    for entry in &cli.traders {
        traders.push(parse_trader_entry(entry)?);
    }

    let okx_credentials = match (var("OKX_API_KEY"), var("OKX_SECRET_KEY"), var("OKX_PASSPHRASE")) {
        (Some(api_key), Some(secret_key), Some(passphrase)) => Some(Credentials { api_key, secret_key, passphrase }),
        (None, None, None) => None,
        _ => {
            warn!("OKX credentials incomplete (need OKX_API_KEY, OKX_SECRET_KEY, OKX_PASSPHRASE), ignoring");
            None
        }
    };

    Ok(Config {
        poll_interval: Duration::from_secs(interval_secs),
        traders,
        traders_file: cli.traders_file.or_else(|| var("TRADERS_FILE").map(PathBuf::from)),
        okx_base_url: var("OKX_BASE_URL").unwrap_or_else(|| DEFAULT_OKX_BASE_URL.to_string()),
        okx_inst_type: var("OKX_INST_TYPE").map(|s| s.to_ascii_uppercase()).unwrap_or_else(|| "SWAP".to_string()),
        okx_credentials,
        http_timeout: Duration::from_secs(number(&var, "HTTP_TIMEOUT_SECS", 15u64).max(1)),
        telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
        telegram_chat_id: var("TELEGRAM_CHAT_ID"),
        telegram_mirror: var("TELEGRAM_MIRROR").map(|v| parse_bool(&v)).unwrap_or(false),
        record_file: cli.record_file.or_else(|| var("RECORD_FILE")),
        metrics_port: cli.metrics_port.unwrap_or_else(|| number(&var, "METRICS_PORT", 9898u16)),
        event_buffer: number(&var, "EVENT_BUFFER", 1024usize),
        console: !cli.no_console,
    })
}

fn number<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, %default, "unparsable number, using default");
            default
        }),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn code_or_link(text: &str) -> Option<String> {
    short_link(text).map(str::to_string).or_else(|| extract_unique_code(text))
}

/// `CODE`, `CODE:NAME`, a profile URL or share link, or `URL:NAME`.
pub fn parse_trader_entry(entry: &str) -> Result<(String, Option<String>), ConfigError> {
    let entry = entry.trim();
    // "https://..." juga mengandung ':', jadi bagian kanan yang diawali "//" bukan nama
    if let Some((left, right)) = entry.rsplit_once(':') {
        if !right.starts_with("//") {
            if let Some(code) = code_or_link(left) {
                let name = right.trim();
                return Ok((code, (!name.is_empty()).then(|| name.to_string())));
            }
        }
    }
    code_or_link(entry)
        .map(|code| (code, None))
        .ok_or_else(|| ConfigError::InvalidTrader(entry.to_string()))
}
