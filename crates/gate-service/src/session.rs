//! Per-session monitoring state: which identities were already admitted,
//! running tallies, and the wall-clock deadline.
//!
//! A session is IDLE (absent), then Running from `start` until its deadline
//! or an external stop, then Finalizing inside `finalize`, which removes it.

use crate::clock::Clock;
use crate::error::GateError;
use chrono::{DateTime, Duration, Utc};
use common::access::{SessionInfo, SessionSummary};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Running,
    Finalizing,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub phase: SessionPhase,
    pub admitted: HashSet<u32>,
    pub frames_processed: u64,
    pub decisions_made: u64,
}

impl SessionState {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            started_at: self.started_at,
            deadline: self.deadline,
            admitted_count: self.admitted.len() as u64,
            frames_processed: self.frames_processed,
            decisions_made: self.decisions_made,
        }
    }
}

pub struct SessionTracker {
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn start(&self, duration: Duration) -> SessionState {
        let now = self.clock.now();
        let state = SessionState {
            id: Uuid::new_v4().to_string(),
            started_at: now,
            deadline: now + duration,
            phase: SessionPhase::Running,
            admitted: HashSet::new(),
            frames_processed: 0,
            decisions_made: 0,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(state.id.clone(), state.clone());
        telemetry::metrics::GATE_ACTIVE_SESSIONS.inc();
        state
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    pub async fn list(&self) -> Vec<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    /// Reject frame processing outside the Running window. Past the
    /// deadline the state machine refuses the call; `finalize` is the only
    /// operation still allowed.
    pub async fn guard_running(&self, session_id: &str) -> Result<(), GateError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GateError::SessionNotFound(session_id.to_string()))?;

        if session.phase != SessionPhase::Running {
            return Err(GateError::SessionNotFound(session_id.to_string()));
        }
        if self.clock.now() > session.deadline {
            return Err(GateError::SessionExpired(session_id.to_string()));
        }
        Ok(())
    }

    pub async fn is_expired(&self, session_id: &str) -> Result<bool, GateError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GateError::SessionNotFound(session_id.to_string()))?;
        Ok(self.clock.now() > session.deadline)
    }

    /// Record an admission; returns true only on the first admission of
    /// that identity in this session (set insertion is idempotent).
    pub async fn record_admission(&self, session_id: &str, identity_id: u32) -> Result<bool, GateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GateError::SessionNotFound(session_id.to_string()))?;
        Ok(session.admitted.insert(identity_id))
    }

    pub async fn note_decision(&self, session_id: &str) -> Result<(), GateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GateError::SessionNotFound(session_id.to_string()))?;
        session.frames_processed += 1;
        session.decisions_made += 1;
        Ok(())
    }

    /// Transition through Finalizing, compute the summary, and remove the
    /// session. Works on expired sessions too; there is no silent abort.
    pub async fn finalize(&self, session_id: &str) -> Result<SessionSummary, GateError> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .remove(session_id)
            .ok_or_else(|| GateError::SessionNotFound(session_id.to_string()))?;
        session.phase = SessionPhase::Finalizing;
        telemetry::metrics::GATE_ACTIVE_SESSIONS.dec();

        let ended_at = self.clock.now();
        Ok(SessionSummary {
            session_id: session.id,
            started_at: session.started_at,
            ended_at,
            identities_admitted: session.admitted.len() as u64,
            frames_processed: session.frames_processed,
            decisions_made: session.decisions_made,
            duration_secs: ended_at
                .signed_duration_since(session.started_at)
                .num_milliseconds() as f64
                / 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker() -> (SessionTracker, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let tracker = SessionTracker::new(Arc::new(clock.clone()));
        (tracker, clock)
    }

    #[tokio::test]
    async fn test_session_runs_until_deadline() {
        let (tracker, clock) = tracker();
        let session = tracker.start(Duration::seconds(20)).await;

        assert!(tracker.guard_running(&session.id).await.is_ok());

        // At the deadline exactly the session is still within its budget.
        clock.advance(Duration::seconds(20));
        assert!(tracker.guard_running(&session.id).await.is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            tracker.guard_running(&session.id).await,
            Err(GateError::SessionExpired(_))
        ));
        assert!(tracker.is_expired(&session.id).await.expect("is_expired"));
    }

    #[tokio::test]
    async fn test_admission_is_idempotent_per_identity() {
        let (tracker, _clock) = tracker();
        let session = tracker.start(Duration::seconds(20)).await;

        assert!(tracker
            .record_admission(&session.id, 7)
            .await
            .expect("admission"));
        assert!(!tracker
            .record_admission(&session.id, 7)
            .await
            .expect("admission"));
        assert!(tracker
            .record_admission(&session.id, 8)
            .await
            .expect("admission"));

        let snapshot = tracker.snapshot(&session.id).await.expect("snapshot");
        assert_eq!(snapshot.admitted.len(), 2);
    }

    #[tokio::test]
    async fn test_finalize_reports_tallies_and_removes_session() {
        let (tracker, clock) = tracker();
        let session = tracker.start(Duration::seconds(20)).await;

        tracker
            .record_admission(&session.id, 1)
            .await
            .expect("admission");
        for _ in 0..3 {
            tracker.note_decision(&session.id).await.expect("note");
        }

        clock.advance(Duration::seconds(5));
        let summary = tracker.finalize(&session.id).await.expect("finalize");
        assert_eq!(summary.identities_admitted, 1);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.decisions_made, 3);
        assert!((summary.duration_secs - 5.0).abs() < 0.001);

        assert!(tracker.snapshot(&session.id).await.is_none());
        assert!(matches!(
            tracker.finalize(&session.id).await,
            Err(GateError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_can_still_finalize() {
        let (tracker, clock) = tracker();
        let session = tracker.start(Duration::seconds(10)).await;

        clock.advance(Duration::seconds(60));
        let summary = tracker.finalize(&session.id).await.expect("finalize");
        assert_eq!(summary.identities_admitted, 0);
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let (tracker, _clock) = tracker();
        assert!(matches!(
            tracker.guard_running("nope").await,
            Err(GateError::SessionNotFound(_))
        ));
    }
}
