use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use anyhow::bail;
use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use nearby_logic::{
    LocationService, PermissionState, RawReading, UtcDT, WatchId, WatchOptions, WatchStream,
    prelude::*,
};

/// One line of a replay file, readings without a timestamp are stamped when they're played
#[derive(Debug, Deserialize)]
struct ReplayEntry {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    timestamp: Option<UtcDT>,
}

impl ReplayEntry {
    fn into_reading(self) -> RawReading {
        RawReading {
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Parse JSON lines, blank lines and lines starting with `#` are skipped
fn parse_entries(raw: &str) -> Result<Vec<ReplayEntry>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Bad reading on line {}", i + 1))
        })
        .collect()
}

/// A [LocationService] that plays back recorded readings
pub struct ReplayLocation {
    entries: Mutex<Option<Vec<ReplayEntry>>>,
    pace: Duration,
    permission: PermissionState,
    next_id: AtomicU32,
    watches: Mutex<HashMap<WatchId, JoinHandle<()>>>,
    finished: CancellationToken,
}

impl ReplayLocation {
    pub fn new(raw: &str, pace: Duration, permission: PermissionState) -> Result<Self> {
        let entries = parse_entries(raw)?;
        if entries.is_empty() {
            bail!("Replay contains no readings");
        }
        Ok(Self {
            entries: Mutex::new(Some(entries)),
            pace,
            permission,
            next_id: AtomicU32::new(1),
            watches: Mutex::new(HashMap::new()),
            finished: CancellationToken::new(),
        })
    }

    pub fn from_file(path: &Path, pace: Duration, permission: PermissionState) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay {}", path.display()))?;
        Self::new(&raw, pace, permission)
    }

    /// Resolves once every reading was played back, the watch was cleared or access was refused
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    fn take_entries(&self) -> Option<Vec<ReplayEntry>> {
        self.entries.lock().ok().and_then(|mut e| e.take())
    }
}

impl LocationService for ReplayLocation {
    async fn request_permission(&self) -> Result<PermissionState> {
        if self.permission != PermissionState::Granted {
            info!("Location access refused, nothing will be replayed");
            self.finished.cancel();
        }
        Ok(self.permission)
    }

    async fn current_position(&self) -> Result<RawReading> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Replay state poisoned"))?;
        let Some(first) = entries.as_ref().and_then(|e| e.first()) else {
            bail!("Replay already consumed");
        };
        Ok(RawReading {
            latitude: first.latitude,
            longitude: first.longitude,
            speed: first.speed,
            timestamp: first.timestamp.unwrap_or_else(Utc::now),
        })
    }

    async fn watch_position(&self, _options: WatchOptions) -> Result<WatchStream> {
        let Some(entries) = self.take_entries() else {
            bail!("Replay can only be watched once");
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, readings) = mpsc::channel(8);
        let pace = self.pace;
        let finished = self.finished.clone();

        info!("Replaying {} readings every {pace:?}", entries.len());

        let task = tokio::spawn(async move {
            for entry in entries {
                if tx.send(entry.into_reading()).await.is_err() {
                    break;
                }
                tokio::time::sleep(pace).await;
            }
            debug!("Replay finished");
            finished.cancel();
        });

        if let Ok(mut watches) = self.watches.lock() {
            watches.insert(id, task);
        }

        Ok(WatchStream { id, readings })
    }

    fn clear_watch(&self, id: WatchId) {
        let task = self.watches.lock().ok().and_then(|mut w| w.remove(&id));
        if let Some(task) = task {
            task.abort();
            self.finished.cancel();
        }
    }
}
