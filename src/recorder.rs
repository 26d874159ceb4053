// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder yang ringan & tahan banting:
// - Tulis setiap MonitorEvent dari event bus ke file .jsonl (append).
// - Bufer dengan BufWriter agar hemat syscall.
// - Flush periodik tiap 1s dan/atau tiap 1000 event.
// - Otomatis membuat parent directory jika belum ada.
// - Jika tulis gagal, coba reopen file dan lanjut.
//
// ENV: set `RECORD_FILE=/path/to/events.jsonl` (atau --record-file) agar aktif.
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::broadcast::{self, error::RecvError},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::MonitorEvent;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    // Pastikan parent directory ada (kalau ada)
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<tokio::fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: broadcast::Receiver<MonitorEvent>, path: String) {
    info!(%path, "recorder: started");
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recorder disabled");
            return;
        }
    };

    // Flush periodik (tiap 1 detik) + flush berbasis jumlah event
    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_last_flush: u32 = 0;
    const FLUSH_EVERY_N_EVENTS: u32 = 1000;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                match maybe_ev {
                    Ok(ev) => {
                        // Serialize event
                        let line = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                error!(?e, "recorder: serialize error, skip event");
                                continue;
                            }
                        };

                        if let Err(e) = write_line(&mut writer, &line).await {
                            error!(?e, "recorder: write failed, attempting reopen");
                            match open_writer(&path).await {
                                Ok(w) => writer = w,
                                Err(e2) => {
                                    error!(?e2, "recorder: reopen failed, drop event");
                                    continue;
                                }
                            }
                            // coba lagi sekali setelah reopen
                            if let Err(e2) = write_line(&mut writer, &line).await {
                                error!(?e2, "recorder: write failed again after reopen, drop event");
                                continue;
                            }
                        }

                        since_last_flush += 1;
                        if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                            let _ = writer.flush().await;
                            since_last_flush = 0;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "recorder: lagged behind event bus");
                    }
                    Err(RecvError::Closed) => {
                        // Channel closed: flush dan keluar
                        let _ = writer.flush().await;
                        info!("recorder: channel closed, stopped");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                // Flush periodik
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let (tx, rx) = broadcast::channel(16);
        let task = tokio::spawn(run(rx, path.to_string_lossy().to_string()));

        tx.send(MonitorEvent::Log("one".into())).unwrap();
        tx.send(MonitorEvent::Error { trader_code: Some("A".into()), message: "two".into() }).unwrap();
        drop(tx);
        task.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["Log"], "one");
    }
}
