// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{info, warn};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Poll loop --------
pub static POLLS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("polls_total", "per-trader position fetches").unwrap());

pub static POLL_ERRORS_BY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("poll_errors_total_by", "failed polls per trader (label: trader)"),
        &["trader"],
    )
    .unwrap()
});

pub static CYCLE_MS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("cycle_duration_ms", "Duration of one full poll cycle (ms)")
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]),
    )
    .unwrap()
});

pub static SCHEDULER_RUNNING: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("scheduler_running", "1 while the poll loop is running").unwrap());

// -------- Signals & delivery --------
pub static SIGNALS_BY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("signals_total_by", "trade signals by action (label: action)"),
        &["action"],
    )
    .unwrap()
});

pub static NOTIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("notifications_total", "notification attempts (label: status)"),
        &["status"],
    )
    .unwrap()
});

// -------- Tracked state --------
pub static TRADERS_TRACKED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("traders_tracked", "traders in the registry").unwrap());

pub static POSITIONS_OPEN: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("positions_open", "open positions per trader at last poll"),
        &["trader"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(POLLS.clone())),
        REGISTRY.register(Box::new(POLL_ERRORS_BY.clone())),
        REGISTRY.register(Box::new(CYCLE_MS.clone())),
        REGISTRY.register(Box::new(SCHEDULER_RUNNING.clone())),
        REGISTRY.register(Box::new(SIGNALS_BY.clone())),
        REGISTRY.register(Box::new(NOTIFICATIONS.clone())),
        REGISTRY.register(Box::new(TRADERS_TRACKED.clone())),
        REGISTRY.register(Box::new(POSITIONS_OPEN.clone())),
    ] {
        if let Err(e) = m {
            warn!(?e, "metric registration failed");
        }
    }
}

// Drop the per-trader series of a trader that is no longer tracked
pub fn forget_trader(code: &str) {
    // Err = series never created, nothing to drop
    let _ = POLL_ERRORS_BY.remove_label_values(&[code]);
    let _ = POSITIONS_OPEN.remove_label_values(&[code]);
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                warn!(%addr, ?e, "metrics bind failed, endpoint disabled");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => warn!(?e, "metrics accept error"),
            }
        }
    });
}
