// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-type loading and error state
//!
//! Each resource type cycles `Idle → Loading → {Loaded | Error}` and back to
//! `Loading` on the next attempt. Several requests of one type may be in
//! flight at once; the type reads as loading until the last one settles.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::resource::ResourceType;

/// Observable fetch state of one resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FetchState {
    Idle,
    Loading,
    Loaded,
    Error(String),
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    states: HashMap<ResourceType, FetchState>,
    in_flight: HashMap<ResourceType, usize>,
    errors: HashMap<ResourceType, String>,
    /// Bumped by `clear` so requests begun before it cannot settle after it
    epoch: u64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for `resource_type` started; clears its last error
    pub fn begin(&mut self, resource_type: ResourceType) {
        *self.in_flight.entry(resource_type).or_insert(0) += 1;
        self.errors.remove(&resource_type);
        self.states.insert(resource_type, FetchState::Loading);
    }

    pub fn succeed(&mut self, resource_type: ResourceType) {
        if self.settle(resource_type) && !self.errors.contains_key(&resource_type) {
            self.states.insert(resource_type, FetchState::Loaded);
        }
    }

    pub fn fail(&mut self, resource_type: ResourceType, message: impl Into<String>) {
        let message = message.into();
        self.errors.insert(resource_type, message.clone());
        if self.settle(resource_type) {
            self.states.insert(resource_type, FetchState::Error(message));
        }
    }

    /// A request was dropped before it settled; it counts as failed.
    /// Ignored when the board was cleared after the request began.
    pub fn cancel(&mut self, resource_type: ResourceType, epoch: u64) {
        if epoch != self.epoch || !self.in_flight.contains_key(&resource_type) {
            return;
        }
        self.fail(resource_type, "Request cancelled");
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Decrement the in-flight count; true once nothing of this type is pending
    fn settle(&mut self, resource_type: ResourceType) -> bool {
        let remaining = match self.in_flight.get_mut(&resource_type) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.in_flight.remove(&resource_type);
            // An earlier failure in this wave wins over a later success
            if let Some(message) = self.errors.get(&resource_type) {
                self.states
                    .insert(resource_type, FetchState::Error(message.clone()));
            }
            true
        } else {
            false
        }
    }

    pub fn state(&self, resource_type: ResourceType) -> FetchState {
        self.states
            .get(&resource_type)
            .cloned()
            .unwrap_or(FetchState::Idle)
    }

    pub fn is_loading(&self, resource_type: ResourceType) -> bool {
        self.in_flight.contains_key(&resource_type)
    }

    /// Last error recorded for `resource_type` since its latest attempt began
    pub fn error(&self, resource_type: ResourceType) -> Option<String> {
        self.errors.get(&resource_type).cloned()
    }

    /// Every type that has left `Idle`
    pub fn snapshot(&self) -> BTreeMap<ResourceType, FetchState> {
        self.states.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.in_flight.clear();
        self.errors.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cycle() {
        let mut board = StatusBoard::new();
        let ty = ResourceType::Condition;
        assert_eq!(board.state(ty), FetchState::Idle);

        board.begin(ty);
        assert!(board.is_loading(ty));
        board.fail(ty, "HTTP 500: boom");
        assert_eq!(board.state(ty), FetchState::Error("HTTP 500: boom".into()));
        assert_eq!(board.error(ty).as_deref(), Some("HTTP 500: boom"));

        board.begin(ty);
        assert_eq!(board.state(ty), FetchState::Loading);
        assert!(board.error(ty).is_none());
        board.succeed(ty);
        assert_eq!(board.state(ty), FetchState::Loaded);
        assert!(!board.is_loading(ty));
    }

    #[test]
    fn test_overlapping_requests_stay_loading() {
        let mut board = StatusBoard::new();
        let ty = ResourceType::Observation;

        board.begin(ty);
        board.begin(ty);
        board.succeed(ty);
        assert!(board.is_loading(ty));
        assert_eq!(board.state(ty), FetchState::Loading);
        board.succeed(ty);
        assert_eq!(board.state(ty), FetchState::Loaded);
    }

    #[test]
    fn test_cancelled_request_is_not_left_loading() {
        let mut board = StatusBoard::new();
        let ty = ResourceType::Encounter;

        board.begin(ty);
        board.cancel(ty, board.epoch());
        assert!(!board.is_loading(ty));
        assert_eq!(board.state(ty), FetchState::Error("Request cancelled".into()));

        board.begin(ty);
        board.succeed(ty);
        assert_eq!(board.state(ty), FetchState::Loaded);

        board.begin(ty);
        let epoch = board.epoch();
        board.clear();
        board.cancel(ty, epoch);
        assert_eq!(board.state(ty), FetchState::Idle);
    }
}
