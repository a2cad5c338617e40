use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerState {
    #[default]
    Idle,
    Counting,
    Indexing,
    Complete,
    Error,
}

/// Progress of the current (or last) full-workspace index run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IndexerStatusSnapshot {
    pub state: IndexerState,
    pub processed: usize,
    pub total: usize,
    /// Between 0 and 100.
    pub percentage: f64,
    pub current_file: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl IndexerStatusSnapshot {
    pub fn is_running(&self) -> bool {
        matches!(self.state, IndexerState::Counting | IndexerState::Indexing)
    }
}

/// Broadcasts [`IndexerStatusSnapshot`]s to any number of observers.
#[derive(Debug)]
pub struct StatusBroadcaster {
    tx: watch::Sender<IndexerStatusSnapshot>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(IndexerStatusSnapshot::default());
        Self { tx }
    }
}

impl StatusBroadcaster {
    pub fn current(&self) -> IndexerStatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IndexerStatusSnapshot> {
        self.tx.subscribe()
    }

    fn publish(&self, snapshot: IndexerStatusSnapshot) {
        self.tx.send_replace(snapshot);
    }

    pub fn counting(&self) {
        self.publish(IndexerStatusSnapshot {
            state: IndexerState::Counting,
            ..IndexerStatusSnapshot::default()
        });
    }

    pub fn progress(&self, processed: usize, total: usize, current_file: Option<PathBuf>) {
        let percentage = if total == 0 {
            100.0
        } else {
            (processed as f64 / total as f64 * 100.0).min(100.0)
        };
        self.publish(IndexerStatusSnapshot {
            state: IndexerState::Indexing,
            processed,
            total,
            percentage,
            current_file,
            error_message: None,
        });
    }

    pub fn complete(&self, processed: usize, total: usize) {
        self.publish(IndexerStatusSnapshot {
            state: IndexerState::Complete,
            processed,
            total,
            percentage: 100.0,
            current_file: None,
            error_message: None,
        });
    }

    /// A cancelled run returns to idle, keeping its partial counts.
    pub fn cancelled(&self, processed: usize, total: usize) {
        let mut snapshot = self.current();
        snapshot.state = IndexerState::Idle;
        snapshot.processed = processed;
        snapshot.total = total;
        snapshot.current_file = None;
        self.publish(snapshot);
    }

    pub fn error(&self, message: impl Into<String>) {
        let mut snapshot = self.current();
        snapshot.state = IndexerState::Error;
        snapshot.current_file = None;
        snapshot.error_message = Some(message.into());
        self.publish(snapshot);
    }
}
