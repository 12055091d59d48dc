// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock helpers for the queue store.
//!
//! The store sits behind one `std::sync::RwLock`. A panic while the lock is
//! held would poison it and every later request would fail; instead these
//! helpers log the event and hand back the guard. Every store mutation is a
//! single short critical section, so the data behind a poisoned lock is still
//! one of the states reachable through the store's own operations.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "queue::locks",
                event = "LOCK_POISONED_READ",
                "queue store lock was poisoned during read; recovering"
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "queue::locks",
                event = "LOCK_POISONED_WRITE",
                "queue store lock was poisoned during write; recovering"
            );
            poisoned.into_inner()
        }
    }
}
