use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fd_lock::RwLock as FileLock;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{
    MatchStore, NOTIFY_CHANNEL_CAPACITY, StoreError, Subscription, next_row, validate_match_id,
};
use crate::models::{MatchWrite, StoredMatch};

type Watchers = Arc<Mutex<HashMap<String, broadcast::Sender<StoredMatch>>>>;

/// Identifies one written row; a change in any part means a new write landed.
type RowStamp = (u64, String, u64);

fn stamp(row: &StoredMatch) -> RowStamp {
    (row.revision, row.origin.clone(), row.origin_seq)
}

/// One JSON file per match in a shared directory.
///
/// Several processes may point at the same directory. Upserts hold an OS lock
/// on `<id>.lock` while reading, bumping and replacing the row. Changes are
/// picked up by a polling thread per watched match, which exits once nobody
/// listens.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    poll_interval: Duration,
    watchers: Watchers,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("Match store directory: {}", root.display());
        Ok(Self {
            root,
            poll_interval,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, match_id: &str) -> PathBuf {
        self.root.join(format!("{match_id}.json"))
    }

    fn lock_file(&self, match_id: &str) -> Result<File, StoreError> {
        let path = self.root.join(format!("{match_id}.lock"));
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?)
    }

    fn spawn_watcher(&self, match_id: String, tx: broadcast::Sender<StoredMatch>) {
        let path = self.path_for(&match_id);
        let poll_interval = self.poll_interval;
        let watchers = Arc::clone(&self.watchers);
        let mut last_seen = read_row(&path).ok().flatten().map(|row| stamp(&row));

        thread::spawn(move || {
            debug!("Watching {} from {:?}", path.display(), last_seen);
            loop {
                thread::sleep(poll_interval);

                {
                    let mut map = watchers.lock();
                    if tx.receiver_count() == 0 {
                        if map.get(&match_id).is_some_and(|current| current.same_channel(&tx)) {
                            map.remove(&match_id);
                        }
                        debug!("Stopped watching {}", path.display());
                        return;
                    }
                }

                match read_row(&path) {
                    Ok(Some(row)) if last_seen.as_ref() != Some(&stamp(&row)) => {
                        last_seen = Some(stamp(&row));
                        let _ = tx.send(row);
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Failed to read {}: {}", path.display(), err),
                }
            }
        });
    }
}

fn read_row(path: &Path) -> Result<Option<StoredMatch>, StoreError> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str::<StoredMatch>(&raw)?))
}

impl MatchStore for FileStore {
    fn fetch(&self, match_id: &str) -> Result<Option<StoredMatch>, StoreError> {
        validate_match_id(match_id)?;
        read_row(&self.path_for(match_id))
    }

    fn upsert(&self, write: MatchWrite) -> Result<StoredMatch, StoreError> {
        validate_match_id(&write.match_id)?;
        let mut lock = FileLock::new(self.lock_file(&write.match_id)?);
        let _guard = lock.write()?;
        let path = self.path_for(&write.match_id);

        let previous = match read_row(&path) {
            Ok(row) => row,
            Err(err) => {
                warn!("Overwriting unreadable row {}: {}", path.display(), err);
                None
            }
        };
        let row = next_row(previous.as_ref(), write);

        // Write-then-rename so pollers never observe a half-written file.
        let tmp_path = path.with_extension(format!("json.tmp-{}", row.origin));
        fs::write(&tmp_path, serde_json::to_vec_pretty(&row)?)?;
        fs::rename(&tmp_path, &path)?;

        debug!("Stored match {} revision {}", row.match_id, row.revision);
        Ok(row)
    }

    fn subscribe(&self, match_id: &str) -> Result<Subscription, StoreError> {
        validate_match_id(match_id)?;
        let mut map = self.watchers.lock();
        if let Some(tx) = map.get(match_id)
            && tx.receiver_count() > 0
        {
            return Ok(Subscription::new(match_id, tx.subscribe()));
        }

        let (tx, rx) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        map.insert(match_id.to_string(), tx.clone());
        drop(map);
        self.spawn_watcher(match_id.to_string(), tx);
        Ok(Subscription::new(match_id, rx))
    }

    fn subscriber_count(&self, match_id: &str) -> usize {
        self.watchers
            .lock()
            .get(match_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
