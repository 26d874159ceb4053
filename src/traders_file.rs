// ===============================
// src/traders_file.rs
// ===============================
//
// Persist daftar trader ke JSON: { "UNIQUECODE": "nickname", ... }
// Ditulis ulang penuh setiap ada perubahan registry (tmp file + rename).
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use crate::domain::{RegistryChange, TraderRecord};
use crate::registry::TraderRegistry;

#[derive(Debug, Error)]
pub enum TradersFileError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("bad json in {path}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
}

/// Missing file means "no traders yet", not an error.
pub fn load(path: &Path) -> Result<Vec<TraderRecord>, TradersFileError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(TradersFileError::Io { path: path.to_path_buf(), source }),
    };
    let map: BTreeMap<String, String> =
        serde_json::from_str(&text).map_err(|source| TradersFileError::Json { path: path.to_path_buf(), source })?;
    Ok(map.into_iter().map(|(code, name)| TraderRecord::new(code, Some(name.as_str()))).collect())
}

pub async fn save(path: &Path, traders: &[TraderRecord]) -> Result<(), TradersFileError> {
    let io_err = |source| TradersFileError::Io { path: path.to_path_buf(), source };
    let map: BTreeMap<&str, &str> = traders.iter().map(|t| (t.code.as_str(), t.display_name.as_str())).collect();
    let body = serde_json::to_string_pretty(&map).map_err(|source| TradersFileError::Json { path: path.to_path_buf(), source })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

/// Rewrite the file after every registry change. Failures are logged; the
/// in-memory registry stays authoritative.
pub async fn run_persist(mut rx: broadcast::Receiver<RegistryChange>, registry: Arc<TraderRegistry>, path: PathBuf) {
    info!(path = %path.display(), "traders file: persistence enabled");
    loop {
        match rx.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {
                let traders = registry.list();
                match save(&path, &traders).await {
                    Ok(()) => info!(count = traders.len(), "traders file saved"),
                    Err(e) => error!(error = %e, "traders file save failed"),
                }
            }
            Err(RecvError::Closed) => {
                warn!("traders file: change stream closed");
                break;
            }
        }
    }
}
