use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    MatchStore, NOTIFY_CHANNEL_CAPACITY, StoreError, Subscription, next_row, validate_match_id,
};
use crate::models::{MatchWrite, StoredMatch};

/// In-process store. Used when overlay and admin share one process, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, StoredMatch>>,
    channels: Mutex<HashMap<String, broadcast::Sender<StoredMatch>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `row` to live subscribers and drops the channel once nobody listens.
    fn notify(&self, row: &StoredMatch) -> usize {
        let mut channels = self.channels.lock();
        let Some(tx) = channels.get(&row.match_id) else {
            return 0;
        };
        if tx.receiver_count() == 0 {
            channels.remove(&row.match_id);
            return 0;
        }
        tx.send(row.clone()).unwrap_or(0)
    }
}

impl MatchStore for MemoryStore {
    fn fetch(&self, match_id: &str) -> Result<Option<StoredMatch>, StoreError> {
        validate_match_id(match_id)?;
        Ok(self.rows.read().get(match_id).cloned())
    }

    fn upsert(&self, write: MatchWrite) -> Result<StoredMatch, StoreError> {
        validate_match_id(&write.match_id)?;
        let match_id = write.match_id.clone();

        // Held across the send so notifications leave in revision order.
        let mut rows = self.rows.write();
        let row = next_row(rows.get(&match_id), write);
        rows.insert(match_id.clone(), row.clone());

        let delivered = self.notify(&row);
        debug!(
            "Stored match {} revision {} (notified {})",
            match_id, row.revision, delivered
        );
        Ok(row)
    }

    fn subscribe(&self, match_id: &str) -> Result<Subscription, StoreError> {
        validate_match_id(match_id)?;
        let mut channels = self.channels.lock();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let rx = channels
            .entry(match_id.to_string())
            .or_insert_with(|| broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0)
            .subscribe();
        Ok(Subscription::new(match_id, rx))
    }

    fn subscriber_count(&self, match_id: &str) -> usize {
        self.channels
            .lock()
            .get(match_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchRecord;
    use chrono::Utc;

    fn write(match_id: &str, title: &str, origin_seq: u64) -> MatchWrite {
        MatchWrite {
            match_id: match_id.to_string(),
            data: MatchRecord {
                title: title.to_string(),
                ..MatchRecord::default()
            },
            updated_at: Utc::now(),
            origin: "test".to_string(),
            origin_seq,
        }
    }

    #[test]
    fn absent_match_fetches_none() {
        let store = MemoryStore::new();
        assert!(store.fetch("match-1").unwrap().is_none());
    }

    #[test]
    fn upsert_assigns_increasing_revisions() {
        let store = MemoryStore::new();
        assert_eq!(store.upsert(write("match-1", "A", 1)).unwrap().revision, 1);
        assert_eq!(store.upsert(write("match-1", "B", 2)).unwrap().revision, 2);
        assert_eq!(store.upsert(write("match-2", "C", 1)).unwrap().revision, 1);

        let row = store.fetch("match-1").unwrap().unwrap();
        assert_eq!(row.data.title, "B");
        assert_eq!(row.origin_seq, 2);
    }

    #[test]
    fn subscribers_only_see_their_match() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("match-1").unwrap();
        store.upsert(write("match-2", "other", 1)).unwrap();
        store.upsert(write("match-1", "mine", 1)).unwrap();

        let row = sub.try_recv().unwrap();
        assert_eq!(row.data.title, "mine");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn dropping_subscription_releases_channel() {
        let store = MemoryStore::new();
        let sub = store.subscribe("match-1").unwrap();
        assert_eq!(store.subscriber_count("match-1"), 1);
        drop(sub);
        assert_eq!(store.subscriber_count("match-1"), 0);
    }

    #[test]
    fn idle_channels_are_pruned() {
        let store = MemoryStore::new();
        store.upsert(write("match-1", "A", 1)).unwrap();
        assert!(store.channels.lock().is_empty());

        drop(store.subscribe("match-1").unwrap());
        store.upsert(write("match-1", "B", 2)).unwrap();
        assert!(store.channels.lock().is_empty());

        drop(store.subscribe("match-2").unwrap());
        let _live = store.subscribe("match-3").unwrap();
        assert_eq!(store.channels.lock().len(), 1);
        assert_eq!(store.subscriber_count("match-3"), 1);
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.subscribe("../x"),
            Err(StoreError::InvalidMatchId(_))
        ));
        assert!(store.upsert(write("", "A", 1)).is_err());
    }
}
