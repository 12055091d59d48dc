// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Race Detection Tests for vidqueue
//!
//! These tests hammer the queue from many tasks at once while the worker is
//! running and check the invariants that must hold at every snapshot.
//!
//! # Running with ThreadSanitizer
//!
//! ```bash
//! # On Linux with nightly Rust:
//! RUSTFLAGS="-Z sanitizer=thread" cargo +nightly test --target x86_64-unknown-linux-gnu --test race_detection_test
//! ```
//!
//! # Invariants
//!
//! - At most one job is processing, and it is in neither `queue` nor `completed`
//! - Every job id appears at most once across the snapshot
//! - Every accepted job is eventually either run or removed, never both

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use common::{job, test_options, ScriptedFetcher};
use vidqueue::queue::{JobStatus, QueueManager, QueueOptions, StatusSnapshot};

// Test configuration
const CONCURRENCY_LEVEL: usize = 16;
const JOBS_PER_TASK: usize = 25;
const TEST_TIMEOUT_SECS: u64 = 30;

fn assert_snapshot_consistent(status: &StatusSnapshot) {
    assert_eq!(status.is_processing, status.current_download.is_some());
    assert_eq!(status.queue_length, status.queue.len());

    let mut seen = HashSet::new();
    for job in status
        .queue
        .iter()
        .chain(status.current_download.iter())
        .chain(status.completed.iter())
    {
        assert!(seen.insert(job.id.clone()), "job {} appears twice", job.id);
    }

    let processing = status
        .queue
        .iter()
        .chain(status.completed.iter())
        .filter(|job| job.status == JobStatus::Processing)
        .count();
    assert_eq!(processing, 0, "processing job leaked out of the current slot");

    if let Some(current) = &status.current_download {
        assert_eq!(current.status, JobStatus::Processing);
    }
    assert!(status.queue.iter().all(|job| job.status == JobStatus::Queued));
    assert!(status.completed.iter().all(|job| job.status.is_terminal()));
}

// =============================================================================
// CONCURRENT ENQUEUE / REMOVE / STATUS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_keep_invariants() {
    let options = QueueOptions {
        history_limit: CONCURRENCY_LEVEL * JOBS_PER_TASK,
        ..test_options()
    };
    let manager = Arc::new(QueueManager::start(options, Arc::new(ScriptedFetcher::new())));
    let removed = Arc::new(AtomicUsize::new(0));
    let accepted = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    // Observer checking every snapshot while producers run.
    let observer = {
        let manager = manager.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut checks = 0usize;
            while !done.load(Ordering::Acquire) {
                assert_snapshot_consistent(&manager.status());
                checks += 1;
                tokio::task::yield_now().await;
            }
            checks
        })
    };

    let mut producers = Vec::new();
    for task in 0..CONCURRENCY_LEVEL {
        let manager = manager.clone();
        let removed = removed.clone();
        let accepted = accepted.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..JOBS_PER_TASK {
                let enqueued = manager
                    .enqueue(job(&format!("t{}-j{}", task, i)))
                    .await
                    .unwrap();
                accepted.fetch_add(1, Ordering::Relaxed);

                // Every third job gets pulled back out if it is still pending.
                if i % 3 == 0 && manager.remove(&enqueued.id) {
                    removed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for producer in producers {
            producer.await.unwrap();
        }

        let total = accepted.load(Ordering::Relaxed);
        loop {
            let status = manager.status();
            let finished = status.completed.len();
            if status.queue_length == 0
                && !status.is_processing
                && finished + removed.load(Ordering::Relaxed) == total
            {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    done.store(true, Ordering::Release);
    let checks = observer.await.unwrap();
    let status = result.expect("Test timed out - possible deadlock");

    assert_snapshot_consistent(&status);
    assert_eq!(accepted.load(Ordering::Relaxed), CONCURRENCY_LEVEL * JOBS_PER_TASK);
    assert!(status.completed.iter().all(|job| job.status == JobStatus::Completed));
    assert!(checks > 0);
}

// =============================================================================
// PER-PRODUCER ORDERING UNDER CONTENTION
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_producer_order_is_preserved() {
    let options = QueueOptions {
        history_limit: 1000,
        ..test_options()
    };
    let fetcher = Arc::new(ScriptedFetcher::new());
    let manager = Arc::new(QueueManager::start(options, fetcher.clone()));

    let mut producers = Vec::new();
    for task in 0..4 {
        let manager = manager.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..20 {
                manager
                    .enqueue(job(&format!("p{}-{:02}", task, i)))
                    .await
                    .unwrap();
            }
        }));
    }

    timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for producer in producers {
            producer.await.unwrap();
        }
        while manager.status().completed.len() < 80 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Test timed out - possible deadlock");

    // A single producer's jobs are run in the order it queued them.
    let calls = fetcher.calls();
    assert_eq!(calls.len(), 80);
    for task in 0..4 {
        let prefix = format!("/p{}-", task);
        let mine: Vec<&String> = calls.iter().filter(|url| url.contains(&prefix)).collect();
        let mut sorted = mine.clone();
        sorted.sort();
        assert_eq!(mine, sorted, "producer {} ran out of order", task);
    }
}

// =============================================================================
// STATUS READERS NEVER BLOCK ON THE WORKER
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_is_available_while_download_runs() {
    let (fetcher, gate) = ScriptedFetcher::gated();
    let manager = Arc::new(QueueManager::start(test_options(), Arc::new(fetcher)));
    manager.enqueue(job("held")).await.unwrap();

    common::wait_for(&manager, "held in flight", |s| s.is_processing).await;

    // The download is parked on the gate; status calls must still return.
    let readers: Vec<_> = (0..CONCURRENCY_LEVEL)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let status = manager.status();
                    assert!(status.is_processing);
                    assert_snapshot_consistent(&status);
                }
            })
        })
        .collect();

    timeout(Duration::from_secs(5), async {
        for reader in readers {
            reader.await.unwrap();
        }
    })
    .await
    .expect("status blocked behind the running download");

    gate.add_permits(1);
    common::wait_for(&manager, "held finished", |s| s.completed.len() == 1).await;
}
