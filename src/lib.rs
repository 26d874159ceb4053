// ===============================
// src/lib.rs
// ===============================
pub mod admin;
pub mod config;
pub mod diff;
pub mod domain;
pub mod event_log;
pub mod fetch;
pub mod formatter;
pub mod metrics;
pub mod notify;
pub mod okx;
pub mod okx_client;
pub mod recorder;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod telegram;
pub mod traders_file;
