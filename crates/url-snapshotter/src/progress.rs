//! Progress events for snapshot runs.
//!
//! The orchestrator emits `ProgressEvent`s through a
//! `tokio::sync::broadcast` channel. Events are observational only: when no
//! subscriber exists they are dropped and the run is unaffected.

use serde::{Deserialize, Serialize};

use crate::types::RunSummary;

/// A progress event emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonically increasing within one run.
    pub seq: u64,
    pub event: ProgressEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    RunStarted {
        total: usize,
        concurrency: usize,
    },
    /// One URL finished, in completion order.
    UrlCompleted {
        index: usize,
        url: String,
        status_code: Option<u16>,
        fetched: bool,
    },
    RunCompleted {
        summary: RunSummary,
        elapsed_ms: u64,
    },
    RunCancelled {
        completed: usize,
        total: usize,
    },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a progress channel. A lagging receiver loses the oldest events.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit an event, ignoring the error returned when nobody is listening.
pub fn emit(tx: &Option<ProgressSender>, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent { seq: *seq, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent {
            seq: 3,
            event: ProgressEventKind::UrlCompleted {
                index: 2,
                url: "https://a.example".to_string(),
                status_code: Some(200),
                fetched: true,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"UrlCompleted\""));
        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_emit_increments_seq() {
        let (tx, mut rx) = channel();
        let tx = Some(tx);
        let mut seq = 0;
        emit(&tx, &mut seq, ProgressEventKind::RunStarted { total: 2, concurrency: 1 });
        emit(&tx, &mut seq, ProgressEventKind::RunCancelled { completed: 0, total: 2 });
        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert_eq!(rx.try_recv().unwrap().seq, 2);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let mut seq = 0;
        emit(&Some(tx), &mut seq, ProgressEventKind::RunStarted { total: 1, concurrency: 1 });
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_emit_none_sender() {
        let mut seq = 0;
        emit(&None, &mut seq, ProgressEventKind::RunStarted { total: 1, concurrency: 1 });
        assert_eq!(seq, 0);
    }
}
