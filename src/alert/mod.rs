// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Emergency alerting - confirmation countdown and simulated dispatch
//!
//! ```text
//!   crash signal ──► Countdown(n) ──tick──► Countdown(n-1) ... ──► Dispatching ──► Active
//!                        │  cancel                    confirm ──┘      police, ambulance,
//!                        ▼                                              contacts (fixed order)
//!                       Idle ◄──────────────────── dismiss ───────────────────────┘
//! ```

mod gate;
mod dispatch;
mod feedback;
mod controller;

#[cfg(feature = "audio")]
mod siren;

pub use gate::{ConfirmationGate, GateState};
pub use dispatch::{DispatchNotifier, DispatchPlan, DispatchSequencer, SimulatedNotifier};
pub use feedback::{FeedbackGuard, FeedbackOutputs, Haptics, LogHaptics, LogSiren, Siren};
pub use controller::{AlertController, AlertHandle, AlertSettings};

#[cfg(feature = "audio")]
pub use siren::CpalSiren;

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::Location;

/// Category of emergency recipient, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Police,
    Ambulance,
    Contacts,
}

impl Channel {
    /// Fixed notification order
    pub const ORDER: [Channel; 3] = [Channel::Police, Channel::Ambulance, Channel::Contacts];

    fn index(&self) -> usize {
        match self {
            Channel::Police => 0,
            Channel::Ambulance => 1,
            Channel::Contacts => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Police => "police",
            Channel::Ambulance => "ambulance",
            Channel::Contacts => "contacts",
        };
        f.write_str(s)
    }
}

/// Per-channel `notified` flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub police: bool,
    pub ambulance: bool,
    pub contacts: bool,
}

impl ChannelStatus {
    pub fn is_notified(&self, channel: Channel) -> bool {
        match channel {
            Channel::Police => self.police,
            Channel::Ambulance => self.ambulance,
            Channel::Contacts => self.contacts,
        }
    }

    /// Set a flag. Refused when an earlier channel is still pending or the
    /// flag is already set.
    pub(crate) fn mark(&mut self, channel: Channel) -> bool {
        if self.is_notified(channel) {
            return false;
        }
        let earlier_pending = Channel::ORDER[..channel.index()]
            .iter()
            .any(|c| !self.is_notified(*c));
        if earlier_pending {
            return false;
        }
        match channel {
            Channel::Police => self.police = true,
            Channel::Ambulance => self.ambulance = true,
            Channel::Contacts => self.contacts = true,
        }
        true
    }

    pub fn all_notified(&self) -> bool {
        self.police && self.ambulance && self.contacts
    }
}

/// Lifecycle state of the alert session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Countdown { remaining: u32 },
    Dispatching,
    Active,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Countdown { remaining } => write!(f, "counting down ({}s)", remaining),
            SessionState::Dispatching => f.write_str("dispatching"),
            SessionState::Active => f.write_str("active"),
        }
    }
}

/// What started the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    CrashDetected,
    Manual,
}

/// Read-only view of the single alert session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSession {
    pub id: Option<Uuid>,
    pub state: SessionState,
    pub channel_status: ChannelStatus,
    pub origin: Option<AlertOrigin>,
    pub started_at: Option<DateTime<Utc>>,
    pub location: Option<Location>,
}

impl Default for AlertSession {
    fn default() -> Self {
        Self::idle()
    }
}

impl AlertSession {
    pub fn idle() -> Self {
        Self {
            id: None,
            state: SessionState::Idle,
            channel_status: ChannelStatus::default(),
            origin: None,
            started_at: None,
            location: None,
        }
    }

    pub(crate) fn begin(origin: AlertOrigin, state: SessionState) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            state,
            channel_status: ChannelStatus::default(),
            origin: Some(origin),
            started_at: Some(Utc::now()),
            location: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    /// Seconds left on the countdown, if one is running
    pub fn remaining(&self) -> Option<u32> {
        match self.state {
            SessionState::Countdown { remaining } => Some(remaining),
            _ => None,
        }
    }
}

/// Session transitions published on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Armed { session: Uuid, origin: AlertOrigin, remaining: u32 },
    CountdownTick { session: Uuid, remaining: u32 },
    Cancelled { session: Uuid },
    Confirmed { session: Uuid },
    DispatchStarted { session: Uuid },
    ChannelNotified { session: Uuid, channel: Channel },
    Active { session: Uuid },
    Dismissed { session: Uuid },
}

impl AlertEvent {
    pub fn session(&self) -> Uuid {
        match self {
            AlertEvent::Armed { session, .. }
            | AlertEvent::CountdownTick { session, .. }
            | AlertEvent::Cancelled { session }
            | AlertEvent::Confirmed { session }
            | AlertEvent::DispatchStarted { session }
            | AlertEvent::ChannelNotified { session, .. }
            | AlertEvent::Active { session }
            | AlertEvent::Dismissed { session } => *session,
        }
    }
}
