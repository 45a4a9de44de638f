// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Invalidation signal handling
//!
//! Listens for "resources changed for subject X" signals on a broadcast
//! channel and refreshes the current patient when X is current. Handled
//! signals are kept in a bounded history for diagnostics.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ProgressiveLoader;

/// Remote notification that a subject's resources changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationSignal {
    pub subject_id: String,
}

impl InvalidationSignal {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// The subject was current and its full bundle was re-fetched
    Refreshed { resources: usize, failed_types: usize },
    /// The subject was not current
    Ignored,
}

/// One handled signal
#[derive(Debug, Clone)]
pub struct InvalidationRecord {
    pub signal: InvalidationSignal,
    pub outcome: InvalidationOutcome,
    pub duration: Duration,
    pub handled_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationStats {
    pub total_signals: u64,
    pub refreshes: u64,
    pub ignored: u64,
    /// Signals dropped because the listener fell behind the channel
    pub lagged: u64,
}

pub struct InvalidationListener {
    loader: Arc<ProgressiveLoader>,
    history: RwLock<VecDeque<InvalidationRecord>>,
    max_history_size: usize,
    stats: RwLock<InvalidationStats>,
}

impl InvalidationListener {
    pub fn new(loader: Arc<ProgressiveLoader>, max_history_size: usize) -> Self {
        Self {
            loader,
            history: RwLock::new(VecDeque::new()),
            max_history_size,
            stats: RwLock::new(InvalidationStats::default()),
        }
    }

    /// Handle one signal and record the outcome
    pub async fn handle(&self, signal: InvalidationSignal) -> InvalidationOutcome {
        let started = Instant::now();
        let outcome = match self
            .loader
            .refresh_patient_resources(&signal.subject_id)
            .await
        {
            Some(bundle) => InvalidationOutcome::Refreshed {
                resources: bundle.resource_count(),
                failed_types: bundle.errors.len(),
            },
            None => InvalidationOutcome::Ignored,
        };

        {
            let mut stats = self.stats.write();
            stats.total_signals += 1;
            match outcome {
                InvalidationOutcome::Refreshed { .. } => stats.refreshes += 1,
                InvalidationOutcome::Ignored => stats.ignored += 1,
            }
        }
        self.record(InvalidationRecord {
            signal,
            outcome: outcome.clone(),
            duration: started.elapsed(),
            handled_at: Utc::now(),
        });
        outcome
    }

    /// Consume signals until the channel closes
    pub fn spawn(
        self: &Arc<Self>,
        mut signals: broadcast::Receiver<InvalidationSignal>,
    ) -> JoinHandle<()> {
        let listener = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        debug!("Invalidation signal for subject {}", signal.subject_id);
                        listener.handle(signal).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Invalidation listener lagged, {} signal(s) dropped", skipped);
                        listener.stats.write().lagged += skipped;
                    }
                    Err(RecvError::Closed) => {
                        info!("Invalidation channel closed");
                        break;
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.read().clone()
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Vec<InvalidationRecord> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.write().clear();
    }

    fn record(&self, record: InvalidationRecord) {
        let mut history = self.history.write();
        if history.len() >= self.max_history_size {
            history.pop_front();
        }
        if self.max_history_size > 0 {
            history.push_back(record);
        }
    }
}
