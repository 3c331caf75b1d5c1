//! Background group runs.
//!
//! A submitted `GroupRun` is driven on its own task; the submitter gets a job id
//! back immediately and polls the snapshot until the run has finished. Jobs are
//! not cancellable: once submitted, a run is driven to its end.

use super::group_run::{GroupOutcome, GroupRun, Step};
use crate::model::{Action, GroupId, UserId};
use crate::runtime::RuntimeClient;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Finished jobs kept around for polling; older ones are dropped first.
const RETAINED_FINISHED: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Running { attempted: usize, total: usize },
    Finished { outcome: GroupOutcome },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub group_id: GroupId,
    pub group: String,
    pub action: Action,
    pub submitted_at: String,
    pub finished_at: Option<String>,
    #[serde(flatten)]
    pub state: JobState,
}

struct JobRecord {
    owner: UserId,
    seq: u64,
    snapshot: JobSnapshot,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    seq: Arc<AtomicU64>,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start driving `run` in the background on behalf of `owner`.
    pub async fn submit(
        &self,
        owner: UserId,
        mut run: GroupRun,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Uuid {
        let job_id = Uuid::new_v4();
        let snapshot = JobSnapshot {
            job_id,
            group_id: run.group_id(),
            group: run.group_name().to_string(),
            action: run.action(),
            submitted_at: now_rfc3339(),
            finished_at: None,
            state: JobState::Running {
                attempted: 0,
                total: run.total(),
            },
        };
        self.jobs.write().await.insert(
            job_id,
            JobRecord {
                owner,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                snapshot,
            },
        );
        self.prune().await;

        tracing::info!(
            job_id = %job_id,
            group_id = run.group_id(),
            action = %run.action(),
            "Group run submitted"
        );

        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            loop {
                match run.advance(runtime.as_ref()).await {
                    Step::Wait(d) => tokio::time::sleep(d).await,
                    Step::Attempted { .. } => {
                        if let Some(rec) = jobs.write().await.get_mut(&job_id) {
                            rec.snapshot.state = JobState::Running {
                                attempted: run.attempted(),
                                total: run.total(),
                            };
                        }
                    }
                    Step::Done => break,
                }
            }
            let outcome = run.outcome();
            tracing::info!(
                job_id = %job_id,
                status = outcome.status.as_str(),
                failures = outcome.errors.len(),
                "Group run finished"
            );
            if let Some(rec) = jobs.write().await.get_mut(&job_id) {
                rec.snapshot.finished_at = Some(now_rfc3339());
                rec.snapshot.state = JobState::Finished { outcome };
            }
        });

        job_id
    }

    /// Snapshot of a job, visible only to the user who submitted it.
    pub async fn snapshot(&self, job_id: Uuid, owner: UserId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .filter(|rec| rec.owner == owner)
            .map(|rec| rec.snapshot.clone())
    }

    async fn prune(&self) {
        let mut jobs = self.jobs.write().await;
        let mut finished: Vec<(u64, Uuid)> = jobs
            .iter()
            .filter(|(_, rec)| matches!(rec.snapshot.state, JobState::Finished { .. }))
            .map(|(id, rec)| (rec.seq, *id))
            .collect();
        if finished.len() <= RETAINED_FINISHED {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - RETAINED_FINISHED;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }
}
