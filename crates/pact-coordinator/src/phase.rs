//! Coordination phases and phase observation
//!
//! Phase transitions flow through a watch channel so the catalog and
//! reporter observe the state machine without participating in it.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;

/// The strictly sequential states of one coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Persisting the participant list
    WritingParticipantList,
    /// Prepare fan-out, waiting for every vote
    SendingPrepare,
    /// Persisting the computed decision
    WritingDecision,
    /// Commit fan-out, waiting for every acknowledgment
    SendingCommit,
    /// Abort fan-out, waiting for every acknowledgment
    SendingAbort,
    /// Deleting the durable record
    DeletingRecord,
    /// Terminal; the coordinator removes itself from the catalog
    Done,
}

impl Phase {
    /// Name exposed to introspection queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::WritingParticipantList => "writingParticipantList",
            Phase::SendingPrepare => "sendingPrepare",
            Phase::WritingDecision => "writingDecision",
            Phase::SendingCommit => "sendingCommit",
            Phase::SendingAbort => "sendingAbort",
            Phase::DeletingRecord => "deletingRecord",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of where a coordination currently is.
#[derive(Debug, Clone)]
pub struct PhaseInfo {
    /// Current phase
    pub phase: Phase,
    /// When the phase was first entered; re-entering the same phase keeps
    /// the original start time
    pub started_at: SystemTime,
    /// Retries performed inside the current phase, for diagnostics
    pub retries: u32,
}

impl PhaseInfo {
    fn enter(phase: Phase) -> Self {
        Self {
            phase,
            started_at: SystemTime::now(),
            retries: 0,
        }
    }
}

/// Publishes phase transitions for one coordinator.
pub(crate) struct PhaseTracker {
    tx: watch::Sender<PhaseInfo>,
}

impl PhaseTracker {
    /// Create a tracker starting in `writingParticipantList`, plus the
    /// receiver handed to the catalog.
    pub(crate) fn new() -> (Arc<Self>, watch::Receiver<PhaseInfo>) {
        let (tx, rx) = watch::channel(PhaseInfo::enter(Phase::WritingParticipantList));
        (Arc::new(Self { tx }), rx)
    }

    /// Move to a phase. Re-entering the current phase is a no-op so the
    /// recorded start time keeps measuring how long the phase has been
    /// active.
    pub(crate) fn enter(&self, phase: Phase) {
        self.tx.send_if_modified(|info| {
            if info.phase == phase {
                return false;
            }
            *info = PhaseInfo::enter(phase);
            true
        });
    }

    /// Bump the retry counter without touching the phase start time.
    pub(crate) fn note_retry(&self) {
        self.tx.send_modify(|info| info.retries += 1);
    }
}
