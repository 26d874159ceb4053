// ===============================
// src/admin.rs (stdin console)
// ===============================
//
// Perintah (slash di depan opsional):
//   add CODE_OR_URL [NAME]   remove CODE   rename CODE NAME
//   list   list-leaders [N]   resync   status   stop   help
//
// Perubahan registry berlaku di cycle berikutnya.
//

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::domain::parse_decimal;
use crate::fetch::TraderDirectory;
use crate::formatter::{format_amount, format_amount_str};
use crate::registry::TraderRegistry;
use crate::scheduler::PollScheduler;

pub const DEFAULT_LEADERS: usize = 20;
pub const MAX_LEADERS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add { input: String, name: Option<String> },
    Remove(String),
    Rename { code: String, name: String },
    List,
    ListLeaders { limit: usize },
    Resync,
    Status,
    Stop,
    Help,
}

pub const HELP: &str =
    "commands: add CODE_OR_URL [NAME] | remove CODE | rename CODE NAME | list | list-leaders [N] | resync | status | stop";

pub fn parse_command(line: &str) -> Option<Command> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let head = parts.first().copied().unwrap_or("").trim_start_matches('/').to_ascii_lowercase();
    let rest = |from: usize| parts.get(from..).map(|p| p.join(" ")).filter(|s| !s.is_empty());
    match head.as_str() {
        "add" if parts.len() >= 2 => Some(Command::Add { input: parts[1].to_string(), name: rest(2) }),
        "remove" | "rm" if parts.len() >= 2 => Some(Command::Remove(parts[1].to_string())),
        "rename" if parts.len() >= 3 => Some(Command::Rename { code: parts[1].to_string(), name: rest(2).unwrap_or_default() }),
        "list" | "ls" => Some(Command::List),
        "list-leaders" | "leaders" => {
            let limit = match parts.get(1) {
                None => DEFAULT_LEADERS,
                Some(n) => n.parse::<usize>().ok()?.clamp(1, MAX_LEADERS),
            };
            Some(Command::ListLeaders { limit })
        }
        "resync" => Some(Command::Resync),
        "status" => Some(Command::Status),
        "stop" | "quit" | "exit" => Some(Command::Stop),
        "help" | "?" => Some(Command::Help),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Stop,
}

/// Win ratio arrives as a fraction ("0.615").
fn percent(raw: &str) -> String {
    match parse_decimal(raw) {
        Some(v) => format!("{}%", format_amount(v * Decimal::from(100))),
        None => "-".to_string(),
    }
}

// kode tak dikenal dipakai apa adanya untuk remove/rename
async fn code_or_raw(directory: &dyn TraderDirectory, input: &str) -> String {
    directory.resolve_code(input).await.unwrap_or_else(|| input.trim().to_string())
}

pub async fn apply(cmd: Command, registry: &TraderRegistry, scheduler: &PollScheduler, directory: &dyn TraderDirectory) -> Outcome {
    let reply = match cmd {
        Command::Add { input, name } => match directory.resolve_code(&input).await {
            None => format!("not a trader code or profile URL: {input}"),
            Some(code) => {
                // check-then-add; add() sendiri juga menolak duplikat
                if let Some(existing) = registry.get(&code) {
                    format!("already tracked: {} ({})", existing.code, existing.display_name)
                } else {
                    match directory.check_trader(&code).await {
                        Err(e) => format!("cannot add {code}: {e}"),
                        Ok(open) if registry.add(&code, name.as_deref()) => {
                            let rec = registry.get(&code).map(|t| t.display_name).unwrap_or_default();
                            format!("added {code} ({rec}), {open} open positions, first poll will seed them")
                        }
                        Ok(_) => format!("already tracked: {code}"),
                    }
                }
            }
        },
        Command::Remove(input) => {
            let code = code_or_raw(directory, &input).await;
            match registry.remove(&code) {
                Some(t) => format!("removed {} ({})", t.code, t.display_name),
                None => format!("not tracked: {code}"),
            }
        }
        Command::Rename { code, name } => {
            let code = code_or_raw(directory, &code).await;
            if registry.rename(&code, &name) {
                format!("renamed {code} -> {name}")
            } else {
                format!("not tracked: {code}")
            }
        }
        Command::List => {
            let traders = registry.list();
            if traders.is_empty() {
                "no traders tracked".to_string()
            } else {
                traders
                    .iter()
                    .enumerate()
                    .map(|(i, t)| format!("{:>2}. {}  {}", i + 1, t.code, t.display_name))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::ListLeaders { limit } => match directory.lead_traders(limit).await {
            Err(e) => format!("lead traders unavailable: {e}"),
            Ok(leaders) if leaders.is_empty() => "no lead traders returned".to_string(),
            Ok(leaders) => leaders
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let mark = if registry.contains(&t.unique_code) { "*" } else { " " };
                    format!(
                        "{:>3}.{mark}{}  {}  pnl {}  win {}  copiers {}",
                        i + 1,
                        t.unique_code,
                        t.nick_name,
                        format_amount_str(&t.pnl),
                        percent(&t.win_ratio),
                        t.copiers()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        },
        Command::Resync => {
            scheduler.resync();
            format!("resync: {} traders will re-seed on next poll", registry.len())
        }
        Command::Status => format!("scheduler={:?} traders={}", scheduler.status(), registry.len()),
        Command::Stop => return Outcome::Stop,
        Command::Help => HELP.to_string(),
    };
    Outcome::Reply(reply)
}

/// Read commands from stdin until `stop` (fires `stop_tx`) or EOF.
pub async fn run(
    registry: Arc<TraderRegistry>,
    scheduler: Arc<PollScheduler>,
    directory: Arc<dyn TraderDirectory>,
    stop_tx: oneshot::Sender<()>,
) {
    info!("admin console ready ({HELP})");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => {
                info!("admin console: stdin closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "admin console: read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            None => println!("? {}\n{HELP}", line.trim()),
            Some(cmd) => match apply(cmd, &registry, &scheduler, directory.as_ref()).await {
                Outcome::Reply(text) => println!("{text}"),
                Outcome::Stop => {
                    info!("admin console: stop requested");
                    let _ = stop_tx.send(());
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::{RawPosition, SnapshotSet};
    use crate::fetch::{FetchError, PositionFetcher};
    use crate::okx::{extract_unique_code, LeadTrader};
    use crate::store::SnapshotStore;

    const GONE: &str = "DEADBEEFDEADBEEF";
    const SHARE_LINK: &str = "https://oyidl.net/ul/whale";

    struct Empty;

    #[async_trait]
    impl PositionFetcher for Empty {
        async fn fetch_positions(&self, _trader_code: &str) -> Result<Vec<RawPosition>, FetchError> {
            Ok(Vec::new())
        }
    }

    /// Knows one share link, refuses GONE, ranks two traders.
    struct Directory;

    #[async_trait]
    impl TraderDirectory for Directory {
        async fn resolve_code(&self, input: &str) -> Option<String> {
            if input == SHARE_LINK {
                return Some("90BCC01689ED93F0".into());
            }
            extract_unique_code(input)
        }

        async fn check_trader(&self, code: &str) -> Result<usize, FetchError> {
            if code == GONE {
                return Err(FetchError::Api { code: "51000".into(), msg: "lead trader not found".into() });
            }
            Ok(2)
        }

        async fn lead_traders(&self, limit: usize) -> Result<Vec<LeadTrader>, FetchError> {
            let rows: Vec<LeadTrader> = serde_json::from_value(serde_json::json!([
                {"uniqueCode": "90BCC01689ED93F0", "nickName": "whale", "pnl": "12345.678", "winRatio": "0.615", "copyTraderNum": "88"},
                {"uniqueCode": "C7966D1C938416B0", "nickName": "eth maxi", "pnl": "-10", "winRatio": "", "accCopyTraderNum": 3}
            ]))
            .unwrap();
            Ok(rows.into_iter().take(limit).collect())
        }
    }

    fn setup() -> (Arc<TraderRegistry>, PollScheduler, Arc<SnapshotStore>) {
        let store = Arc::new(SnapshotStore::new());
        let registry = Arc::new(TraderRegistry::new(store.clone()));
        let scheduler = PollScheduler::new(registry.clone(), store.clone(), Arc::new(Empty), 64);
        (registry, scheduler, store)
    }

    fn reply(o: Outcome) -> String {
        match o {
            Outcome::Reply(s) => s,
            Outcome::Stop => panic!("unexpected stop"),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("add 90BCC01689ED93F0 big whale"),
            Some(Command::Add { input: "90BCC01689ED93F0".into(), name: Some("big whale".into()) })
        );
        assert_eq!(parse_command("/add 90BCC01689ED93F0"), Some(Command::Add { input: "90BCC01689ED93F0".into(), name: None }));
        assert_eq!(parse_command("RM X"), Some(Command::Remove("X".into())));
        assert_eq!(parse_command("rename X new name"), Some(Command::Rename { code: "X".into(), name: "new name".into() }));
        assert_eq!(parse_command("  status "), Some(Command::Status));
        assert_eq!(parse_command("stop"), Some(Command::Stop));
        assert_eq!(parse_command("list-leaders"), Some(Command::ListLeaders { limit: DEFAULT_LEADERS }));
        assert_eq!(parse_command("/leaders 500"), Some(Command::ListLeaders { limit: MAX_LEADERS }));
        assert_eq!(parse_command("leaders 0"), Some(Command::ListLeaders { limit: 1 }));
        assert_eq!(parse_command("leaders many"), None);
        assert_eq!(parse_command("add"), None);
        assert_eq!(parse_command("rename X"), None);
        assert_eq!(parse_command("dance"), None);
    }

    #[tokio::test]
    async fn add_reports_already_tracked() {
        let (registry, scheduler, _) = setup();
        let url = "https://www.okx.com/copy-trading/account/90BCC01689ED93F0?tab=swap";
        let first = reply(apply(Command::Add { input: url.into(), name: Some("whale".into()) }, &registry, &scheduler, &Directory).await);
        assert!(first.starts_with("added 90BCC01689ED93F0 (whale), 2 open positions"));

        let again = reply(apply(Command::Add { input: "90BCC01689ED93F0".into(), name: None }, &registry, &scheduler, &Directory).await);
        assert!(again.starts_with("already tracked"));
        assert_eq!(registry.len(), 1);

        let bad = reply(apply(Command::Add { input: "x".into(), name: None }, &registry, &scheduler, &Directory).await);
        assert!(bad.starts_with("not a trader code"));
    }

    #[tokio::test]
    async fn add_resolves_share_links() {
        let (registry, scheduler, _) = setup();
        let r = reply(apply(Command::Add { input: SHARE_LINK.into(), name: None }, &registry, &scheduler, &Directory).await);
        assert!(r.starts_with("added 90BCC01689ED93F0"), "{r}");
        assert!(registry.contains("90BCC01689ED93F0"));

        // the same trader through its share link is a duplicate
        let again = reply(apply(Command::Add { input: SHARE_LINK.into(), name: None }, &registry, &scheduler, &Directory).await);
        assert!(again.starts_with("already tracked: 90BCC01689ED93F0"));
    }

    #[tokio::test]
    async fn add_refuses_unreachable_trader() {
        let (registry, scheduler, _) = setup();
        let r = reply(apply(Command::Add { input: GONE.into(), name: None }, &registry, &scheduler, &Directory).await);
        assert_eq!(r, format!("cannot add {GONE}: api error 51000: lead trader not found"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn remove_and_rename() {
        let (registry, scheduler, _) = setup();
        registry.add("90BCC01689ED93F0", Some("whale"));

        let r = reply(apply(Command::Rename { code: "90BCC01689ED93F0".into(), name: "orca".into() }, &registry, &scheduler, &Directory).await);
        assert_eq!(r, "renamed 90BCC01689ED93F0 -> orca");
        assert!(reply(apply(Command::List, &registry, &scheduler, &Directory).await).contains("orca"));

        let r = reply(apply(Command::Remove(SHARE_LINK.into()), &registry, &scheduler, &Directory).await);
        assert_eq!(r, "removed 90BCC01689ED93F0 (orca)");
        assert_eq!(reply(apply(Command::List, &registry, &scheduler, &Directory).await), "no traders tracked");
        let r = reply(apply(Command::Remove("90BCC01689ED93F0".into()), &registry, &scheduler, &Directory).await);
        assert!(r.starts_with("not tracked"));
    }

    #[tokio::test]
    async fn list_leaders_marks_tracked() {
        let (registry, scheduler, _) = setup();
        registry.add("C7966D1C938416B0", None);

        let text = reply(apply(Command::ListLeaders { limit: 20 }, &registry, &scheduler, &Directory).await);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "  1. 90BCC01689ED93F0  whale  pnl 12,345.68  win 61.50%  copiers 88");
        assert_eq!(lines[1], "  2.*C7966D1C938416B0  eth maxi  pnl -10.00  win -  copiers 3");

        let one = reply(apply(Command::ListLeaders { limit: 1 }, &registry, &scheduler, &Directory).await);
        assert_eq!(one.lines().count(), 1);
    }

    #[tokio::test]
    async fn resync_and_status() {
        let (registry, scheduler, store) = setup();
        registry.add("A1", None);
        store.record_first_seen("A1", SnapshotSet::new());
        assert!(!store.is_first_poll("A1"));

        apply(Command::Resync, &registry, &scheduler, &Directory).await;
        assert!(store.is_first_poll("A1"));
        assert_eq!(reply(apply(Command::Status, &registry, &scheduler, &Directory).await), "scheduler=Stopped traders=1");
        assert_eq!(apply(Command::Stop, &registry, &scheduler, &Directory).await, Outcome::Stop);
    }
}
