//! Progress events streamed to the caller while a task runs.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What happened, plus the data the caller needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressKind {
    /// Task accepted and conversation seeded.
    Started { query: String },
    /// About to ask the model for its next message.
    ModelThinking { round: usize },
    /// A tool call is about to run.
    ToolInvoked {
        call_id: String,
        name: String,
        arguments: Value,
    },
    /// A tool call finished (successfully or not).
    ToolCompleted {
        call_id: String,
        name: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_category: Option<String>,
    },
    /// The model produced its final answer.
    Final { answer: String },
    /// The task failed.
    Failed { reason: String },
}

impl ProgressKind {
    /// Event name used on the wire (SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::ModelThinking { .. } => "model-thinking",
            Self::ToolInvoked { .. } => "tool-invoked",
            Self::ToolCompleted { .. } => "tool-completed",
            Self::Final { .. } => "final",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Failed { .. })
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub task_id: Uuid,
    /// Strictly increasing within a task, starting at 0.
    pub seq: u64,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

/// Ordered progress channel for one task.
///
/// Emits at most one terminal event and nothing after it. Once the task's
/// cancellation token fires, nothing further is emitted at all. Dropping an
/// uncancelled streamer before its terminal event emits `failed`.
#[derive(Debug)]
pub struct StatusStreamer {
    task_id: Uuid,
    next_seq: u64,
    terminated: bool,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    cancel: CancellationToken,
}

impl StatusStreamer {
    pub fn new(
        task_id: Uuid,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let streamer = Self {
            task_id,
            next_seq: 0,
            terminated: false,
            tx,
            cancel,
        };
        (streamer, rx)
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Whether a terminal event has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Emit an event. Returns `false` if it was suppressed because the stream
    /// already terminated or the task was cancelled.
    pub fn emit(&mut self, kind: ProgressKind) -> bool {
        if self.terminated || self.cancel.is_cancelled() {
            tracing::trace!(
                task_id = %self.task_id,
                event = kind.name(),
                "Suppressed progress event"
            );
            return false;
        }

        self.terminated = kind.is_terminal();
        let event = ProgressEvent {
            task_id: self.task_id,
            seq: self.next_seq,
            kind,
        };
        self.next_seq += 1;

        // A dropped receiver just means nobody is listening any more.
        if self.tx.send(event).is_err() {
            tracing::debug!(task_id = %self.task_id, "Progress receiver dropped");
        }
        true
    }
}

impl Drop for StatusStreamer {
    /// A task that stops without a terminal event and was not cancelled has
    /// aborted (for instance by panicking), so close the stream with `failed`.
    fn drop(&mut self) {
        if self.terminated || self.cancel.is_cancelled() {
            return;
        }
        tracing::error!(task_id = %self.task_id, "Task ended without a terminal event");
        self.emit(ProgressKind::Failed {
            reason: "task aborted unexpectedly".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn sequence_numbers_increase() {
        let (mut streamer, mut rx) =
            StatusStreamer::new(Uuid::new_v4(), CancellationToken::new());
        streamer.emit(ProgressKind::Started { query: "q".into() });
        streamer.emit(ProgressKind::ModelThinking { round: 0 });
        streamer.emit(ProgressKind::Final { answer: "a".into() });

        let seqs: Vec<u64> = drain(&mut rx).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn nothing_follows_a_terminal_event() {
        let (mut streamer, mut rx) =
            StatusStreamer::new(Uuid::new_v4(), CancellationToken::new());
        assert!(streamer.emit(ProgressKind::Failed { reason: "boom".into() }));
        assert!(streamer.is_terminated());
        assert!(!streamer.emit(ProgressKind::Final { answer: "late".into() }));
        assert!(!streamer.emit(ProgressKind::ModelThinking { round: 1 }));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind.name(), "failed");
    }

    #[test]
    fn cancellation_silences_the_stream() {
        let cancel = CancellationToken::new();
        let (mut streamer, mut rx) = StatusStreamer::new(Uuid::new_v4(), cancel.clone());
        streamer.emit(ProgressKind::Started { query: "q".into() });
        cancel.cancel();
        assert!(!streamer.emit(ProgressKind::Final { answer: "a".into() }));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn abandoned_stream_is_closed_with_failed() {
        let (mut streamer, mut rx) =
            StatusStreamer::new(Uuid::new_v4(), CancellationToken::new());
        streamer.emit(ProgressKind::Started { query: "q".into() });
        drop(streamer);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].seq, 1);
        assert_eq!(
            events[1].kind,
            ProgressKind::Failed {
                reason: "task aborted unexpectedly".into()
            }
        );
    }

    #[test]
    fn finished_or_cancelled_streams_add_nothing_on_drop() {
        let (mut streamer, mut rx) =
            StatusStreamer::new(Uuid::new_v4(), CancellationToken::new());
        streamer.emit(ProgressKind::Final { answer: "a".into() });
        drop(streamer);
        assert_eq!(drain(&mut rx).len(), 1);

        let cancel = CancellationToken::new();
        let (mut streamer, mut rx) = StatusStreamer::new(Uuid::new_v4(), cancel.clone());
        streamer.emit(ProgressKind::Started { query: "q".into() });
        cancel.cancel();
        drop(streamer);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (mut streamer, rx) = StatusStreamer::new(Uuid::new_v4(), CancellationToken::new());
        drop(rx);
        assert!(streamer.emit(ProgressKind::Started { query: "q".into() }));
    }

    #[test]
    fn events_serialize_with_kebab_case_tags() {
        let event = ProgressEvent {
            task_id: Uuid::nil(),
            seq: 3,
            kind: ProgressKind::ToolCompleted {
                call_id: "call_1".into(),
                name: "get_recent_commits".into(),
                success: false,
                error_category: Some("rate-limited".into()),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool-completed");
        assert_eq!(value["seq"], 3);
        assert_eq!(value["error_category"], "rate-limited");
        assert_eq!(
            serde_json::to_value(ProgressKind::ModelThinking { round: 2 }).unwrap(),
            json!({"type": "model-thinking", "round": 2})
        );
    }
}
