// ===============================
// src/notify.rs
// ===============================
//
// Pipeline notifikasi:
// - Notifier trait  : kirim teks (Telegram, log, ...)
// - run             : subscriber event bus -> format -> notify
//
// Gagal kirim cukup di-log + dihitung di metrics; tidak ada retry di sini.
//

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::domain::{MonitorEvent, TraderRecord};
use crate::formatter;
use crate::metrics::NOTIFICATIONS;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier not configured")]
    NotConfigured,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api rejected message: {0}")]
    Api(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Fallback when no delivery channel is configured: messages go to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        info!(target: "notification", "\n{text}");
        Ok(())
    }
}

/// Send one message, record the outcome. Never fails the caller.
pub async fn deliver(notifier: &dyn Notifier, text: &str) -> bool {
    match notifier.notify(text).await {
        Ok(()) => {
            NOTIFICATIONS.with_label_values(&["ok"]).inc();
            true
        }
        Err(e) => {
            NOTIFICATIONS.with_label_values(&["failed"]).inc();
            warn!(error = %e, "notification delivery failed");
            false
        }
    }
}

pub fn started_message(traders: &[TraderRecord], interval_secs: u64) -> String {
    let names: Vec<&str> = traders.iter().map(|t| t.display_name.as_str()).collect();
    format!(
        "🚀 Monitor started\n\nTraders: {}\nInterval: {}s",
        if names.is_empty() { "-".to_string() } else { names.join(", ") },
        interval_secs
    )
}

pub fn stopped_message() -> String {
    "⏹️ Monitor stopped".to_string()
}

/// Dispatcher task: every Signal on the bus becomes one notification.
pub async fn run(mut rx: broadcast::Receiver<MonitorEvent>, notifier: Arc<dyn Notifier>) {
    loop {
        match rx.recv().await {
            Ok(MonitorEvent::Signal(sig)) => {
                let text = formatter::format(&sig);
                deliver(notifier.as_ref(), &text).await;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "notify: dispatcher lagged, events dropped"),
            Err(RecvError::Closed) => {
                info!("notify: event bus closed, stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{Side, TradeAction, TradeSignal};

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Capture {
        async fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
            Err(NotifyError::NotConfigured)
        }
    }

    #[tokio::test]
    async fn dispatcher_formats_only_signals() {
        let (tx, rx) = broadcast::channel(16);
        let cap = Arc::new(Capture::default());
        let task = tokio::spawn(run(rx, cap.clone()));

        tx.send(MonitorEvent::Log("hello".into())).unwrap();
        tx.send(MonitorEvent::Signal(TradeSignal {
            trader_code: "A".into(),
            trader_display_name: "alpha".into(),
            action: TradeAction::OpenShort,
            instrument: "ETH-USDT-SWAP".into(),
            side: Side::Short,
            quantity: Some(Decimal::new(3, 0)),
            price: Some(Decimal::new(2500, 0)),
            previous_quantity: Some(Decimal::ZERO),
            timestamp: Utc::now(),
        }))
        .unwrap();
        drop(tx);
        task.await.unwrap();

        let sent = cap.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Open Short"));
        assert!(sent[0].contains("3.00 ETH"));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        assert!(!deliver(&Broken, "x").await);
        assert!(deliver(&LogNotifier, "x").await);
    }

    #[test]
    fn started_message_lists_traders() {
        let msg = started_message(&[TraderRecord::new("A", Some("alpha")), TraderRecord::new("B", Some("beta"))], 30);
        assert!(msg.contains("alpha, beta"));
        assert!(msg.contains("30s"));
    }
}
