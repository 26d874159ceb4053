// ===============================
// src/event_log.rs
// ===============================
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use crate::domain::MonitorEvent;


pub async fn run(mut rx: broadcast::Receiver<MonitorEvent>) {
loop {
match rx.recv().await {
Ok(MonitorEvent::Log(msg)) => info!(%msg, "monitor"),
Ok(MonitorEvent::Error { trader_code, message }) => warn!(trader=?trader_code, %message, "monitor error"),
Ok(MonitorEvent::Signal(sig)) => debug!(trader=%sig.trader_code, action=sig.action.as_str(), qty=?sig.quantity, px=?sig.price, "SIGNAL"),
Ok(MonitorEvent::PositionsRefreshed { trader_code, positions, .. }) => debug!(trader=%trader_code, open=positions.len(), "POSITIONS"),
Ok(MonitorEvent::SchedulerState(st)) => info!(state=?st, "scheduler"),
Err(RecvError::Lagged(n)) => warn!(skipped=n, "event log lagged"),
Err(RecvError::Closed) => break,
}
}
}
