// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory queue state.
//!
//! `QueueStore` owns every job: the FIFO of pending jobs, the single in-flight
//! job, and a bounded history of finished ones. It is not thread safe by
//! itself; [`crate::queue::QueueManager`] keeps it behind one `RwLock` so each
//! method below is one linearizable step.

use std::collections::VecDeque;

use serde::Serialize;

use super::types::{DownloadJob, JobOutcome, JobStatus, NewJob};
use crate::error::QueueError;

/// Default number of finished jobs kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Queue state: pending FIFO, in-flight slot and finished history.
#[derive(Debug, Clone)]
pub struct QueueStore {
    pending: VecDeque<DownloadJob>,
    current: Option<DownloadJob>,
    history: VecDeque<DownloadJob>,
    history_limit: usize,
}

/// Consistent point-in-time copy of the store.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub pending: Vec<DownloadJob>,
    pub current: Option<DownloadJob>,
    pub history: Vec<DownloadJob>,
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl QueueStore {
    /// Create an empty store keeping at most `history_limit` finished jobs.
    pub fn new(history_limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Validate a request and append it to the tail of the pending queue.
    ///
    /// Returns the new job's id. Invalid requests never enter the queue.
    pub fn enqueue(&mut self, request: NewJob) -> Result<String, QueueError> {
        let request = request.validate()?;
        let job = DownloadJob::new(request);
        let id = job.id.clone();
        self.pending.push_back(job);
        Ok(id)
    }

    /// Claim the head of the pending queue.
    ///
    /// The job leaves `pending` and becomes the in-flight job with status
    /// `processing` in the same step. Returns `None` when nothing is pending
    /// or a job is already in flight.
    pub fn dequeue_next(&mut self) -> Option<DownloadJob> {
        if self.current.is_some() {
            return None;
        }

        let mut job = self.pending.pop_front()?;
        if let Err(e) = job.start() {
            // Only queued jobs live in `pending`, so this is unreachable in practice.
            tracing::error!(job_id = %job.id, error = %e, "Dropping unclaimable job");
            return None;
        }
        self.current = Some(job.clone());
        Some(job)
    }

    /// Remove a pending job. Returns false when `id` is not pending.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.pending.iter().position(|job| job.id == id) {
            Some(index) => self.pending.remove(index).is_some(),
            None => false,
        }
    }

    /// Drop every pending job; the in-flight job is untouched.
    pub fn clear_pending(&mut self) -> usize {
        let removed = self.pending.len();
        self.pending.clear();
        removed
    }

    /// Finish the in-flight job and move it into history.
    ///
    /// Fails with [`QueueError::NotInFlight`] without mutating anything when
    /// `id` is not the in-flight job.
    pub fn record_result(&mut self, id: &str, outcome: JobOutcome) -> Result<DownloadJob, QueueError> {
        match self.current.take() {
            Some(mut job) if job.id == id => {
                if let Err(e) = job.finish(outcome) {
                    self.current = Some(job);
                    return Err(e);
                }
                self.push_history(job.clone());
                Ok(job)
            }
            other => {
                self.current = other;
                Err(QueueError::NotInFlight(id.to_string()))
            }
        }
    }

    fn push_history(&mut self, job: DownloadJob) {
        self.history.push_back(job);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Forget every finished job. Returns how many were dropped.
    pub fn clear_history(&mut self) -> usize {
        let removed = self.history.len();
        self.history.clear();
        removed
    }

    /// Copy the whole store.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().cloned().collect(),
            current: self.current.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }

    /// 1-based position of a pending job.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.pending.iter().position(|job| job.id == id).map(|i| i + 1)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Count of jobs as (pending, processing, completed, failed).
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let completed = self
            .history
            .iter()
            .filter(|job| job.status == JobStatus::Completed)
            .count();
        (
            self.pending.len(),
            usize::from(self.current.is_some()),
            completed,
            self.history.len() - completed,
        )
    }
}
