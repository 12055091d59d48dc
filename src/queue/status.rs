// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read model of the queue for status queries and polling observers.
//!
//! [`project`] turns a store snapshot into the `GET /queue-status` payload.
//! [`diff`] is what an observer uses to reconcile two consecutive polls.

use std::collections::HashSet;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::locks::resilient_read;
use super::store::{QueueSnapshot, QueueStore};
use super::types::{DownloadJob, JobStatus};

/// Immutable view of the queue handed to external consumers.
///
/// Every field has a serde default so observers tolerate partial payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    /// True iff a job is in flight
    #[serde(default)]
    pub is_processing: bool,
    #[serde(default)]
    pub queue_length: usize,
    #[serde(default)]
    pub current_download: Option<DownloadJob>,
    /// Pending jobs in FIFO order
    #[serde(default)]
    pub queue: Vec<DownloadJob>,
    /// Finished jobs (completed and failed), oldest first
    #[serde(default)]
    pub completed: Vec<DownloadJob>,
    /// Failed subset of `completed`
    #[serde(default)]
    pub failed: Vec<DownloadJob>,
}

impl From<QueueSnapshot> for StatusSnapshot {
    fn from(snapshot: QueueSnapshot) -> Self {
        let failed = snapshot
            .history
            .iter()
            .filter(|job| job.status == JobStatus::Failed)
            .cloned()
            .collect();

        Self {
            is_processing: snapshot.current.is_some(),
            queue_length: snapshot.pending.len(),
            current_download: snapshot.current,
            queue: snapshot.pending,
            completed: snapshot.history,
            failed,
        }
    }
}

/// Build a status snapshot from the store. Takes only a read lock.
pub fn project(store: &RwLock<QueueStore>) -> StatusSnapshot {
    let snapshot = resilient_read(store).snapshot();
    StatusSnapshot::from(snapshot)
}

impl StatusSnapshot {
    /// Find a job anywhere in the snapshot.
    pub fn find(&self, id: &str) -> Option<&DownloadJob> {
        self.all_jobs().find(|job| job.id == id)
    }

    fn all_jobs(&self) -> impl Iterator<Item = &DownloadJob> {
        self.queue
            .iter()
            .chain(self.current_download.iter())
            .chain(self.completed.iter())
    }
}

/// One change an observer noticed between two polls.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// A job appeared in the pending queue
    Queued(DownloadJob),
    /// A pending job disappeared without being run
    Removed(DownloadJob),
    /// A job became the current download
    Started(DownloadJob),
    /// A job reached history
    Finished(DownloadJob),
}

/// Compare two consecutive polls.
///
/// With no previous poll there is nothing to reconcile and no change is
/// reported. Jobs that started and finished between two polls only show up
/// as `Finished`.
pub fn diff(prev: Option<&StatusSnapshot>, next: &StatusSnapshot) -> Vec<StatusChange> {
    let Some(prev) = prev else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    let prev_ids: HashSet<&str> = prev.all_jobs().map(|job| job.id.as_str()).collect();
    let next_ids: HashSet<&str> = next.all_jobs().map(|job| job.id.as_str()).collect();
    let prev_finished: HashSet<&str> = prev.completed.iter().map(|job| job.id.as_str()).collect();

    for job in prev.queue.iter().filter(|job| !next_ids.contains(job.id.as_str())) {
        changes.push(StatusChange::Removed(job.clone()));
    }

    for job in next.queue.iter().filter(|job| !prev_ids.contains(job.id.as_str())) {
        changes.push(StatusChange::Queued(job.clone()));
    }

    for job in next
        .completed
        .iter()
        .filter(|job| !prev_finished.contains(job.id.as_str()))
    {
        changes.push(StatusChange::Finished(job.clone()));
    }

    if let Some(current) = &next.current_download {
        let same = prev
            .current_download
            .as_ref()
            .is_some_and(|job| job.id == current.id);
        if !same {
            changes.push(StatusChange::Started(current.clone()));
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::types::{JobOutcome, NewJob};

    fn request(name: &str) -> NewJob {
        NewJob::new(format!("https://example.com/{}", name)).with_title(name)
    }

    fn store_with(names: &[&str]) -> QueueStore {
        let mut store = QueueStore::default();
        for name in names {
            store.enqueue(request(name)).unwrap();
        }
        store
    }

    fn status(store: &QueueStore) -> StatusSnapshot {
        StatusSnapshot::from(store.snapshot())
    }

    #[test]
    fn test_project_empty_store() {
        let store = RwLock::new(QueueStore::default());
        let snapshot = project(&store);
        assert!(!snapshot.is_processing);
        assert_eq!(snapshot.queue_length, 0);
        assert!(snapshot.current_download.is_none());
        assert!(snapshot.queue.is_empty() && snapshot.completed.is_empty());
    }

    #[test]
    fn test_project_reflects_processing() {
        let mut store = store_with(&["a", "b", "c"]);
        let a = store.dequeue_next().unwrap();

        let snapshot = status(&store);
        assert!(snapshot.is_processing);
        assert_eq!(snapshot.queue_length, 2);
        assert_eq!(snapshot.current_download.as_ref().unwrap().id, a.id);
        assert!(snapshot.queue.iter().all(|job| job.id != a.id));
    }

    #[test]
    fn test_project_splits_failed() {
        let mut store = store_with(&["a", "b"]);
        let a = store.dequeue_next().unwrap();
        store.record_result(&a.id, JobOutcome::completed("ok")).unwrap();
        let b = store.dequeue_next().unwrap();
        store.record_result(&b.id, JobOutcome::failed("boom")).unwrap();

        let snapshot = status(&store);
        assert_eq!(snapshot.completed.len(), 2);
        assert_eq!(snapshot.failed.len(), 1);
        assert_eq!(snapshot.failed[0].id, b.id);
    }

    #[test]
    fn test_status_tolerates_null_and_missing_fields() {
        let snapshot: StatusSnapshot =
            serde_json::from_str(r#"{"success":true,"current_download":null}"#).unwrap();
        assert_eq!(snapshot, StatusSnapshot::default());
    }

    #[test]
    fn test_diff_first_poll_is_quiet() {
        let store = store_with(&["a"]);
        assert!(diff(None, &status(&store)).is_empty());
    }

    #[test]
    fn test_diff_tracks_lifecycle() {
        let mut store = store_with(&["a", "b"]);
        let first = status(&store);

        let a = store.dequeue_next().unwrap();
        let c = store.enqueue(request("c")).unwrap();
        let second = status(&store);
        let changes = diff(Some(&first), &second);
        assert!(changes.contains(&StatusChange::Started(second.current_download.clone().unwrap())));
        assert!(changes
            .iter()
            .any(|change| matches!(change, StatusChange::Queued(job) if job.id == c)));

        store.record_result(&a.id, JobOutcome::completed("ok")).unwrap();
        let b_id = store.snapshot().pending[0].id.clone();
        assert!(store.remove(&b_id));
        let third = status(&store);
        let changes = diff(Some(&second), &third);
        assert!(changes
            .iter()
            .any(|change| matches!(change, StatusChange::Finished(job) if job.id == a.id)));
        assert!(changes
            .iter()
            .any(|change| matches!(change, StatusChange::Removed(job) if job.id == b_id)));
        assert!(!changes.iter().any(|change| matches!(change, StatusChange::Started(_))));
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let mut store = store_with(&["a", "b"]);
        store.dequeue_next();
        let snapshot = status(&store);
        assert!(diff(Some(&snapshot), &snapshot.clone()).is_empty());
    }
}
