use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::models::{MatchPatch, MatchRecord, MatchWrite, PlayerPatch, Side, StoredMatch, merge_player};
use crate::services::match_store::{MatchStore, Subscription};

/// Issues kept for display; older ones are dropped.
const MAX_ISSUES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncIssue {
    FetchFailed(String),
    WriteFailed { seq: u64, message: String },
    /// A change from another editor replaced unsettled local edits.
    Overwritten { revision: u64, origin: String },
    SubscriptionLost(String),
}

impl std::fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncIssue::FetchFailed(message) => write!(f, "Fetch failed: {message}"),
            SyncIssue::WriteFailed { seq, message } => {
                write!(f, "Write #{seq} failed: {message}")
            }
            SyncIssue::Overwritten { revision, origin } => write!(
                f,
                "Local edits overwritten by revision {revision} from another editor ({origin})"
            ),
            SyncIssue::SubscriptionLost(message) => write!(f, "Live updates lost: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    /// Revision not newer than what is already applied.
    Stale,
    /// Own older write; local data is already ahead.
    OwnEchoSuperseded,
    /// Applied on top of unsettled local edits.
    AppliedOverPending,
}

/// Local copy of one match. Store rows fold in last-write-wins by revision;
/// own echoes older than the newest local edit never roll it back.
#[derive(Debug, Clone)]
pub struct SyncState {
    client_id: String,
    phase: SyncPhase,
    data: MatchRecord,
    updated_at: Option<DateTime<Utc>>,
    applied_revision: u64,
    applied_origin: Option<(String, u64)>,
    local_seq: u64,
    settled_seq: u64,
    conflicts: u64,
    issues: Vec<SyncIssue>,
}

impl SyncState {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            phase: SyncPhase::Loading,
            data: MatchRecord::default(),
            updated_at: None,
            applied_revision: 0,
            applied_origin: None,
            local_seq: 0,
            settled_seq: 0,
            conflicts: 0,
            issues: Vec::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SyncPhase::Loading
    }

    pub fn data(&self) -> &MatchRecord {
        &self.data
    }

    /// Timestamp of the last applied store row.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn applied_revision(&self) -> u64 {
        self.applied_revision
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts
    }

    pub fn issues(&self) -> &[SyncIssue] {
        &self.issues
    }

    pub fn has_pending_writes(&self) -> bool {
        self.local_seq > self.settled_seq
    }

    fn push_issue(&mut self, issue: SyncIssue) {
        self.issues.push(issue);
        if self.issues.len() > MAX_ISSUES {
            self.issues.remove(0);
        }
    }

    /// First fetch result. Absent rows keep the defaults.
    pub fn apply_fetch(&mut self, fetched: Option<StoredMatch>) -> Option<RemoteOutcome> {
        self.phase = SyncPhase::Ready;
        fetched.map(|row| self.apply_remote(row))
    }

    /// Failed fetch: defaults stay, the state still becomes ready.
    pub fn apply_fetch_failure(&mut self, message: impl Into<String>) {
        self.phase = SyncPhase::Ready;
        self.push_issue(SyncIssue::FetchFailed(message.into()));
    }

    pub fn apply_remote(&mut self, row: StoredMatch) -> RemoteOutcome {
        let already_applied = row.revision == self.applied_revision
            && self
                .applied_origin
                .as_ref()
                .is_some_and(|(origin, seq)| *origin == row.origin && *seq == row.origin_seq);
        if row.revision < self.applied_revision || already_applied {
            return RemoteOutcome::Stale;
        }
        self.applied_revision = row.revision;
        self.applied_origin = Some((row.origin.clone(), row.origin_seq));

        if row.origin == self.client_id {
            self.settled_seq = self.settled_seq.max(row.origin_seq);
            if row.origin_seq < self.local_seq {
                return RemoteOutcome::OwnEchoSuperseded;
            }
            self.data = row.data;
            self.updated_at = Some(row.updated_at);
            return RemoteOutcome::Applied;
        }

        let overwrote_pending = self.has_pending_writes();
        self.data = row.data;
        self.updated_at = Some(row.updated_at);
        if overwrote_pending {
            self.conflicts += 1;
            warn!(
                "Revision {} from {} replaced unsettled local edits",
                row.revision, row.origin
            );
            self.push_issue(SyncIssue::Overwritten {
                revision: row.revision,
                origin: row.origin,
            });
            RemoteOutcome::AppliedOverPending
        } else {
            RemoteOutcome::Applied
        }
    }

    /// Optimistic local edit. Returns the edit's sequence number.
    pub fn apply_local(&mut self, record: MatchRecord) -> u64 {
        self.local_seq += 1;
        self.data = record;
        self.local_seq
    }

    pub fn apply_write_ack(&mut self, seq: u64) {
        self.settled_seq = self.settled_seq.max(seq);
    }

    /// The edit stays applied locally; the store keeps whatever it had.
    pub fn apply_write_failure(&mut self, seq: u64, message: impl Into<String>) {
        self.settled_seq = self.settled_seq.max(seq);
        self.push_issue(SyncIssue::WriteFailed {
            seq,
            message: message.into(),
        });
    }

    pub fn apply_subscription_lost(&mut self, message: impl Into<String>) {
        self.push_issue(SyncIssue::SubscriptionLost(message.into()));
    }
}

#[derive(Debug)]
enum SyncEvent {
    Fetched(Result<Option<StoredMatch>, String>),
    Remote(StoredMatch),
    WriteAck { seq: u64, revision: u64 },
    WriteFailed { seq: u64, message: String },
    SubscriptionLost(String),
}

enum SyncCommand {
    Write(MatchWrite),
    Shutdown,
}

/// Called from the worker after every event, e.g. to request a repaint.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

struct EventEmitter {
    tx: Sender<SyncEvent>,
    notifier: Option<Notifier>,
}

impl EventEmitter {
    fn emit(&self, event: SyncEvent) {
        if self.tx.send(event).is_ok()
            && let Some(notify) = &self.notifier
        {
            notify();
        }
    }
}

/// Keeps one match in sync with a store: fetch on start, live changes, optimistic updates.
pub struct MatchSyncClient {
    match_id: String,
    state: SyncState,
    command_tx: tokio_mpsc::UnboundedSender<SyncCommand>,
    event_rx: Receiver<SyncEvent>,
    worker: Option<JoinHandle<()>>,
    worker_gone: bool,
}

impl MatchSyncClient {
    pub fn connect(store: Arc<dyn MatchStore>, match_id: &str) -> Self {
        Self::connect_with_notifier(store, match_id, None)
    }

    pub fn connect_with_notifier(
        store: Arc<dyn MatchStore>,
        match_id: &str,
        notifier: Option<Notifier>,
    ) -> Self {
        let client_id = Ulid::new().to_string();
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel::<SyncCommand>();
        let (event_tx, event_rx) = mpsc::channel::<SyncEvent>();
        let emitter = EventEmitter {
            tx: event_tx,
            notifier,
        };

        let mut state = SyncState::new(client_id.clone());
        let worker_match_id = match_id.to_string();
        let worker = thread::Builder::new()
            .name(format!("match-sync-{match_id}"))
            .spawn(move || run_worker(store, worker_match_id, command_rx, emitter));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("Failed to start sync worker for {}: {}", match_id, err);
                state.apply_fetch_failure(format!("sync worker did not start: {err}"));
                None
            }
        };

        info!("Sync client {} connected to match {}", client_id, match_id);
        Self {
            match_id: match_id.to_string(),
            state,
            command_tx,
            event_rx,
            worker_gone: worker.is_none(),
            worker,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn data(&self) -> &MatchRecord {
        self.state.data()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Set local state right away and queue a full-record write.
    /// Write failures are recorded as [`SyncIssue`]s, never returned.
    pub fn update(&mut self, record: MatchRecord) {
        let seq = self.state.apply_local(record.clone());
        let write = MatchWrite {
            match_id: self.match_id.clone(),
            data: record,
            updated_at: Utc::now(),
            origin: self.state.client_id().to_string(),
            origin_seq: seq,
        };
        if self.command_tx.send(SyncCommand::Write(write)).is_err() {
            warn!("Sync worker for {} is gone, write #{} dropped", self.match_id, seq);
            self.state.apply_write_failure(seq, "sync worker stopped");
        }
    }

    /// Shallow-merge `patch` onto the current record and update.
    pub fn update_match(&mut self, patch: MatchPatch) {
        let record = patch.merged(self.state.data());
        self.update(record);
    }

    /// Shallow-merge `patch` into one player of the current record and update.
    pub fn update_player(&mut self, side: Side, patch: PlayerPatch) {
        let record = merge_player(self.state.data(), side, patch);
        self.update(record);
    }

    /// Apply every event the worker has produced so far. Returns true if anything changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    changed = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    changed |= self.handle_worker_gone();
                    break;
                }
            }
        }
        changed
    }

    /// Wait up to `timeout` for at least one event, then drain the rest.
    pub fn pump_timeout(&mut self, timeout: Duration) -> bool {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                self.pump();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => self.handle_worker_gone(),
        }
    }

    /// Pump until `done` holds or `timeout` passes. Returns whether `done` held.
    pub fn pump_until(&mut self, timeout: Duration, done: impl Fn(&SyncState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done(&self.state) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump_timeout(deadline - now);
        }
    }

    fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Fetched(Ok(row)) => {
                let revision = row.as_ref().map(|row| row.revision);
                self.state.apply_fetch(row);
                match revision {
                    Some(revision) => info!("Loaded match {} at revision {}", self.match_id, revision),
                    None => info!("Match {} not stored yet, using defaults", self.match_id),
                }
            }
            SyncEvent::Fetched(Err(message)) => {
                warn!("Fetching match {} failed: {}", self.match_id, message);
                self.state.apply_fetch_failure(message);
            }
            SyncEvent::Remote(row) => {
                let revision = row.revision;
                let outcome = self.state.apply_remote(row);
                debug!("Change {} for {}: {:?}", revision, self.match_id, outcome);
            }
            SyncEvent::WriteAck { seq, revision } => {
                debug!("Write #{} for {} stored as revision {}", seq, self.match_id, revision);
                self.state.apply_write_ack(seq);
            }
            SyncEvent::WriteFailed { seq, message } => {
                warn!("Write #{} for {} failed: {}", seq, self.match_id, message);
                self.state.apply_write_failure(seq, message);
            }
            SyncEvent::SubscriptionLost(message) => {
                warn!("Live updates for {} lost: {}", self.match_id, message);
                self.state.apply_subscription_lost(message);
            }
        }
    }

    fn handle_worker_gone(&mut self) -> bool {
        if self.worker_gone {
            return false;
        }
        self.worker_gone = true;
        warn!("Sync worker for {} disconnected", self.match_id);
        if self.state.is_loading() {
            self.state.apply_fetch_failure("sync worker disconnected");
        } else {
            self.state.apply_subscription_lost("sync worker disconnected");
        }
        true
    }
}

impl Drop for MatchSyncClient {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SyncCommand::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Sync worker for {} panicked", self.match_id);
        }
        debug!("Sync client for {} closed", self.match_id);
    }
}

enum WorkerStep {
    Continue,
    SubscriptionClosed,
    Stop,
}

async fn next_change(subscription: &mut Option<Subscription>) -> Option<StoredMatch> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

fn run_worker(
    store: Arc<dyn MatchStore>,
    match_id: String,
    mut command_rx: tokio_mpsc::UnboundedReceiver<SyncCommand>,
    emitter: EventEmitter,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            emitter.emit(SyncEvent::Fetched(Err(format!(
                "failed to initialize sync runtime: {err}"
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        // Subscribe first so nothing written during the fetch is missed.
        let mut subscription = match store.subscribe(&match_id) {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                emitter.emit(SyncEvent::SubscriptionLost(err.to_string()));
                None
            }
        };

        let fetch_store = Arc::clone(&store);
        let fetch_id = match_id.clone();
        let fetched = match tokio::task::spawn_blocking(move || fetch_store.fetch(&fetch_id)).await
        {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(err) => Err(format!("fetch task failed: {err}")),
        };
        emitter.emit(SyncEvent::Fetched(fetched));

        loop {
            let step = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SyncCommand::Write(write)) => {
                        let seq = write.origin_seq;
                        let write_store = Arc::clone(&store);
                        let event = match tokio::task::spawn_blocking(move || write_store.upsert(write)).await {
                            Ok(Ok(row)) => SyncEvent::WriteAck { seq, revision: row.revision },
                            Ok(Err(err)) => SyncEvent::WriteFailed { seq, message: err.to_string() },
                            Err(err) => SyncEvent::WriteFailed { seq, message: format!("write task failed: {err}") },
                        };
                        emitter.emit(event);
                        WorkerStep::Continue
                    }
                    Some(SyncCommand::Shutdown) | None => WorkerStep::Stop,
                },
                change = next_change(&mut subscription) => match change {
                    Some(row) => {
                        emitter.emit(SyncEvent::Remote(row));
                        WorkerStep::Continue
                    }
                    None => WorkerStep::SubscriptionClosed,
                },
            };

            match step {
                WorkerStep::Continue => {}
                WorkerStep::SubscriptionClosed => {
                    subscription = None;
                    emitter.emit(SyncEvent::SubscriptionLost("store closed the channel".to_string()));
                }
                WorkerStep::Stop => break,
            }
        }
        debug!("Sync worker for {} stopped", match_id);
    });
}
