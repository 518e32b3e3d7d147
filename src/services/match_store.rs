mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::models::{MatchWrite, StoredMatch};

/// Capacity of each per-match notification channel
const NOTIFY_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid match id: {0:?}")]
    InvalidMatchId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait MatchStore: Send + Sync + 'static {
    /// Current row for `match_id`, `None` if it was never written.
    fn fetch(&self, match_id: &str) -> Result<Option<StoredMatch>, StoreError>;

    /// Replace the whole row and notify subscribers. Returns the stored row.
    fn upsert(&self, write: MatchWrite) -> Result<StoredMatch, StoreError>;

    /// Open a change channel scoped to `match_id`. Dropping it releases the channel.
    fn subscribe(&self, match_id: &str) -> Result<Subscription, StoreError>;

    /// Live subscriptions for `match_id`.
    fn subscriber_count(&self, match_id: &str) -> usize;
}

/// Receiving end of a per-match change channel.
pub struct Subscription {
    match_id: String,
    receiver: broadcast::Receiver<StoredMatch>,
}

impl Subscription {
    fn new(match_id: &str, receiver: broadcast::Receiver<StoredMatch>) -> Self {
        Self {
            match_id: match_id.to_string(),
            receiver,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Next change, `None` once the store side is gone.
    ///
    /// Lagging drops the skipped rows; rows carry full state so the next one
    /// is still a complete picture.
    pub async fn recv(&mut self) -> Option<StoredMatch> {
        loop {
            match self.receiver.recv().await {
                Ok(row) => return Some(row),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, skipped {} change(s)", self.match_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<StoredMatch> {
        loop {
            match self.receiver.try_recv() {
                Ok(row) => return Some(row),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, skipped {} change(s)", self.match_id, skipped);
                }
                Err(_) => return None,
            }
        }
    }
}

/// Match ids double as file names, so only a conservative character set is allowed.
pub fn validate_match_id(match_id: &str) -> Result<(), StoreError> {
    let valid = !match_id.is_empty()
        && match_id.len() <= 128
        && !match_id.starts_with('.')
        && match_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidMatchId(match_id.to_string()))
    }
}

fn next_row(previous: Option<&StoredMatch>, write: MatchWrite) -> StoredMatch {
    StoredMatch {
        match_id: write.match_id,
        data: write.data,
        updated_at: write.updated_at,
        revision: previous.map_or(1, |row| row.revision + 1),
        origin: write.origin,
        origin_seq: write.origin_seq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_ids_are_restricted_to_file_safe_names() {
        assert!(validate_match_id("match-1").is_ok());
        assert!(validate_match_id("day2_finals.b").is_ok());
        assert!(validate_match_id("").is_err());
        assert!(validate_match_id("../etc").is_err());
        assert!(validate_match_id(".hidden").is_err());
        assert!(validate_match_id("match 1").is_err());
        assert!(validate_match_id("a/b").is_err());
    }
}
