// ===============================
// src/main.rs
// ===============================
/*
 # metrics
 curl -s localhost:9898/metrics | egrep '^(polls_total|signals_total_by|scheduler_running)'

 # satu trader, interval 30s, tanpa console
 cargo run -- --trader 90BCC01689ED93F0:whale --interval 30 --no-console
*/
/*
=============================================================================
Project : copytrade_watch: async copy-trading position monitor in Rust
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Polls lead traders' public positions (OKX), diffs successive
          snapshots into open/close/add/reduce signals, notifies via
          Telegram, exposes Prometheus metrics, and records JSONL events.
=============================================================================
*/
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use copytrade_watch::{
    admin, config, event_log,
    fetch::TraderDirectory,
    metrics, notify,
    notify::{LogNotifier, Notifier},
    okx_client::OkxClient,
    recorder,
    registry::TraderRegistry,
    scheduler::PollScheduler,
    store::SnapshotStore,
    telegram::{self, TelegramNotifier},
    traders_file,
};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let cfg = match config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "config error");
            std::process::exit(2);
        }
    };

    info!(
        interval_secs = cfg.poll_interval.as_secs(),
        okx = %cfg.okx_base_url,
        inst_type = %cfg.okx_inst_type,
        telegram = cfg.telegram_enabled(),
        mirror = cfg.telegram_mirror,
        traders_file = ?cfg.traders_file,
        record_file = ?cfg.record_file,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if cfg.metrics_port != 0 {
        metrics::serve_metrics(cfg.metrics_port);
    }

    // ---- OKX client (dipakai juga untuk resolve share link) ----
    let okx = match OkxClient::new(&cfg.okx_base_url, &cfg.okx_inst_type, cfg.http_timeout, cfg.okx_credentials.clone()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "http client init failed");
            std::process::exit(1);
        }
    };

    // ---- Store + registry ----
    let store = Arc::new(SnapshotStore::new());
    let registry = Arc::new(TraderRegistry::new(store.clone()));

    // file dulu, lalu env/CLI (duplikat diabaikan)
    if let Some(path) = &cfg.traders_file {
        match traders_file::load(path) {
            Ok(list) => {
                for t in list {
                    registry.add(&t.code, Some(t.display_name.as_str()));
                }
            }
            Err(e) => warn!(error = %e, "traders file not loaded"),
        }
    }
    for (input, name) in &cfg.traders {
        match okx.resolve_code(input).await {
            Some(code) => {
                registry.add(&code, name.as_deref());
            }
            None => warn!(input = %input, "trader entry could not be resolved, skipped"),
        }
    }
    if let Some(path) = &cfg.traders_file {
        if let Err(e) = traders_file::save(path, &registry.list()).await {
            warn!(error = %e, "traders file not written");
        }
    }
    if registry.is_empty() {
        warn!("no traders configured yet; add some with the console or --trader");
    }

    // ---- Collaborators ----
    let telegram: Option<Arc<dyn Notifier>> = match (&cfg.telegram_bot_token, &cfg.telegram_chat_id) {
        (Some(token), Some(chat)) => match TelegramNotifier::new(token, chat, cfg.http_timeout) {
            Ok(t) => Some(Arc::new(t) as Arc<dyn Notifier>),
            Err(e) => {
                warn!(error = %e, "telegram disabled");
                None
            }
        },
        _ => None,
    };
    let notifier: Arc<dyn Notifier> = match &telegram {
        Some(t) => t.clone(),
        None => Arc::new(LogNotifier),
    };

    let scheduler = Arc::new(PollScheduler::new(registry.clone(), store.clone(), okx.clone(), cfg.event_buffer));

    // ---- Subscribers ----
    tokio::spawn(event_log::run(scheduler.subscribe()));
    tokio::spawn(notify::run(scheduler.subscribe(), notifier.clone()));
    if let Some(path) = cfg.record_file.clone() {
        tokio::spawn(recorder::run(scheduler.subscribe(), path));
    }
    if let Some(path) = cfg.traders_file.clone() {
        tokio::spawn(traders_file::run_persist(registry.subscribe_changes(), registry.clone(), path));
    }
    if cfg.telegram_mirror {
        match &telegram {
            Some(t) => {
                tokio::spawn(telegram::run_mirror(registry.subscribe_changes(), t.clone()));
            }
            None => warn!("TELEGRAM_MIRROR set but telegram is not configured"),
        }
    }

    // ---- Credential check (log only) ----
    if okx.has_credentials() {
        match okx.check_credentials().await {
            Ok(()) => info!("okx credentials ok"),
            Err(e) => warn!(error = %e, "okx credential check failed"),
        }
    }

    // ---- Start ----
    notify::deliver(notifier.as_ref(), &notify::started_message(&registry.list(), cfg.poll_interval.as_secs())).await;
    if let Err(e) = scheduler.start(cfg.poll_interval) {
        error!(error = %e, "scheduler start failed");
        std::process::exit(1);
    }

    let (stop_tx, stop_rx) = oneshot::channel();
    if cfg.console {
        tokio::spawn(admin::run(registry.clone(), scheduler.clone(), okx.clone() as Arc<dyn TraderDirectory>, stop_tx));
    } else {
        drop(stop_tx);
    }

    // ---- Wait: Ctrl-C atau `stop` dari console ----
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
        res = stop_rx => match res {
            Ok(()) => info!("stop requested from console"),
            // console tidak ada / stdin ditutup: tunggu Ctrl-C saja
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                info!("ctrl-c received");
            }
        },
    }

    scheduler.stop().await;
    notify::deliver(notifier.as_ref(), &notify::stopped_message()).await;
    info!("bye");
}
