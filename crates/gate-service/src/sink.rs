//! Append-only audit sinks: the per-attempt decision trail, deduplicated
//! first-grant records, session summaries, and unknown-face captures.

use crate::verify::UnknownFaceSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::access::{Decision, GateDecision, SessionSummary};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// One entry in the per-attempt decision trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub session_id: String,
    pub decision: GateDecision,
}

/// Deduplicated record of the first admission of an identity in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstGrantRecord {
    pub session_id: String,
    pub identity_id: u32,
    pub granted_at: DateTime<Utc>,
}

/// A single audit record, tagged for the JSON-lines file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogRecord {
    Attempt(AttemptRecord),
    FirstGrant(FirstGrantRecord),
    SessionSummary(SessionSummary),
}

/// Append-only persistence of gate decisions. Appends are monotonic:
/// records are never reordered or deleted within a session.
#[async_trait]
pub trait AccessLog: Send + Sync {
    async fn append_attempt(&self, session_id: &str, decision: &GateDecision) -> Result<()>;

    async fn append_first_grant(
        &self,
        session_id: &str,
        identity_id: u32,
        granted_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn append_session_summary(&self, summary: &SessionSummary) -> Result<()>;

    /// Most recent attempt records, newest last.
    async fn recent_attempts(&self, limit: usize) -> Result<Vec<AttemptRecord>>;

    /// Derived counter: granted attempts recorded for an identity.
    async fn access_count(&self, identity_id: u32) -> Result<u64>;
}

/// In-memory audit log preserving global append order.
#[derive(Default)]
pub struct MemoryAccessLog {
    records: RwLock<Vec<LogRecord>>,
}

impl MemoryAccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in append order.
    pub async fn records(&self) -> Vec<LogRecord> {
        self.records.read().await.clone()
    }

    pub async fn attempts(&self) -> Vec<AttemptRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter_map(|record| match record {
                LogRecord::Attempt(attempt) => Some(attempt.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn first_grants(&self) -> Vec<FirstGrantRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter_map(|record| match record {
                LogRecord::FirstGrant(grant) => Some(grant.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn summaries(&self) -> Vec<SessionSummary> {
        self.records
            .read()
            .await
            .iter()
            .filter_map(|record| match record {
                LogRecord::SessionSummary(summary) => Some(summary.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl AccessLog for MemoryAccessLog {
    async fn append_attempt(&self, session_id: &str, decision: &GateDecision) -> Result<()> {
        self.records.write().await.push(LogRecord::Attempt(AttemptRecord {
            session_id: session_id.to_string(),
            decision: decision.clone(),
        }));
        Ok(())
    }

    async fn append_first_grant(
        &self,
        session_id: &str,
        identity_id: u32,
        granted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.records
            .write()
            .await
            .push(LogRecord::FirstGrant(FirstGrantRecord {
                session_id: session_id.to_string(),
                identity_id,
                granted_at,
            }));
        Ok(())
    }

    async fn append_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.records
            .write()
            .await
            .push(LogRecord::SessionSummary(summary.clone()));
        Ok(())
    }

    async fn recent_attempts(&self, limit: usize) -> Result<Vec<AttemptRecord>> {
        let attempts = self.attempts().await;
        let skip = attempts.len().saturating_sub(limit);
        Ok(attempts.into_iter().skip(skip).collect())
    }

    async fn access_count(&self, identity_id: u32) -> Result<u64> {
        Ok(self
            .attempts()
            .await
            .iter()
            .filter(|attempt| {
                attempt.decision.decision == Decision::Granted
                    && attempt
                        .decision
                        .matched_identity
                        .as_ref()
                        .map(|identity| identity.id == identity_id)
                        .unwrap_or(false)
            })
            .count() as u64)
    }
}

const TAIL_CAPACITY: usize = 1024;

/// JSON-lines audit log. Each record is one tagged line; the file is opened
/// in append mode and replayed at startup to rebuild the recent-attempt
/// tail and the per-identity grant counters.
pub struct JsonlAccessLog {
    file: Mutex<tokio::fs::File>,
    tail: RwLock<VecDeque<AttemptRecord>>,
    grant_counts: RwLock<HashMap<u32, u64>>,
}

impl JsonlAccessLog {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut tail = VecDeque::with_capacity(TAIL_CAPACITY);
        let mut grant_counts: HashMap<u32, u64> = HashMap::new();

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let existing = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            for line in existing.lines().filter(|line| !line.trim().is_empty()) {
                match serde_json::from_str::<LogRecord>(line) {
                    Ok(LogRecord::Attempt(attempt)) => {
                        if attempt.decision.decision == Decision::Granted {
                            if let Some(identity) = &attempt.decision.matched_identity {
                                *grant_counts.entry(identity.id).or_insert(0) += 1;
                            }
                        }
                        if tail.len() == TAIL_CAPACITY {
                            tail.pop_front();
                        }
                        tail.push_back(attempt);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "skipping unparseable audit record"),
                }
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;

        Ok(Self {
            file: Mutex::new(file),
            tail: RwLock::new(tail),
            grant_counts: RwLock::new(grant_counts),
        })
    }

    async fn write_record(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("failed to serialize audit record")?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .context("failed to append audit record")?;
        file.flush().await.context("failed to flush audit log")?;
        Ok(())
    }
}

#[async_trait]
impl AccessLog for JsonlAccessLog {
    async fn append_attempt(&self, session_id: &str, decision: &GateDecision) -> Result<()> {
        let attempt = AttemptRecord {
            session_id: session_id.to_string(),
            decision: decision.clone(),
        };
        self.write_record(&LogRecord::Attempt(attempt.clone())).await?;

        if attempt.decision.decision == Decision::Granted {
            if let Some(identity) = &attempt.decision.matched_identity {
                *self
                    .grant_counts
                    .write()
                    .await
                    .entry(identity.id)
                    .or_insert(0) += 1;
            }
        }

        let mut tail = self.tail.write().await;
        if tail.len() == TAIL_CAPACITY {
            tail.pop_front();
        }
        tail.push_back(attempt);
        Ok(())
    }

    async fn append_first_grant(
        &self,
        session_id: &str,
        identity_id: u32,
        granted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.write_record(&LogRecord::FirstGrant(FirstGrantRecord {
            session_id: session_id.to_string(),
            identity_id,
            granted_at,
        }))
        .await
    }

    async fn append_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.write_record(&LogRecord::SessionSummary(summary.clone()))
            .await
    }

    async fn recent_attempts(&self, limit: usize) -> Result<Vec<AttemptRecord>> {
        let tail = self.tail.read().await;
        let skip = tail.len().saturating_sub(limit);
        Ok(tail.iter().skip(skip).cloned().collect())
    }

    async fn access_count(&self, identity_id: u32) -> Result<u64> {
        Ok(self
            .grant_counts
            .read()
            .await
            .get(&identity_id)
            .copied()
            .unwrap_or(0))
    }
}

/// Writes unknown-face captures as JPEG files into a review directory.
pub struct DirUnknownFaceSink {
    dir: PathBuf,
}

impl DirUnknownFaceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl UnknownFaceSink for DirUnknownFaceSink {
    async fn capture(&self, jpeg: &[u8], at: DateTime<Utc>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let filename = format!(
            "unknown_{}_{:03}.jpg",
            at.timestamp(),
            at.timestamp_subsec_millis()
        );
        let path = self.dir.join(filename);
        tokio::fs::write(&path, jpeg)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Collects unknown-face captures in memory. Test use only.
#[derive(Default)]
pub struct MemoryUnknownFaceSink {
    captures: std::sync::Mutex<Vec<Vec<u8>>>,
}

impl MemoryUnknownFaceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.captures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl UnknownFaceSink for MemoryUnknownFaceSink {
    async fn capture(&self, jpeg: &[u8], _at: DateTime<Utc>) -> Result<()> {
        self.captures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(jpeg.to_vec());
        Ok(())
    }
}
