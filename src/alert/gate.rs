// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Confirmation countdown between a crash signal and dispatch

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    /// Counting down, waiting for the user
    Armed,
    /// Escalated to dispatch
    Confirmed,
    /// User reported they are okay
    Cancelled,
}

/// One-second countdown that escalates unless cancelled.
///
/// `remaining` only decreases; once `Confirmed` or `Cancelled` the gate
/// ignores further ticks and actions.
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    state: GateState,
    remaining: u32,
}

impl ConfirmationGate {
    /// Arm with `seconds` on the clock. A zero-length countdown is confirmed
    /// immediately.
    pub fn arm(seconds: u32) -> Self {
        let state = if seconds == 0 { GateState::Confirmed } else { GateState::Armed };
        Self { state, remaining: seconds }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_armed(&self) -> bool {
        self.state == GateState::Armed
    }

    /// Advance one second. Reaching zero confirms.
    pub fn tick(&mut self) -> GateState {
        if self.state == GateState::Armed {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.state = GateState::Confirmed;
            }
        }
        self.state
    }

    /// Returns false if the gate was not armed
    pub fn cancel(&mut self) -> bool {
        if self.state != GateState::Armed {
            return false;
        }
        self.state = GateState::Cancelled;
        true
    }

    /// Escalate without waiting for the countdown
    pub fn confirm(&mut self) -> bool {
        if self.state != GateState::Armed {
            return false;
        }
        self.state = GateState::Confirmed;
        true
    }
}
