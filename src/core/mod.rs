//! Core engine module - wires detection, alerting and the event bus

mod engine;
mod event_bus;
mod timer;

pub use engine::Engine;
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use timer::StateTimer;

use serde::{Deserialize, Serialize};

use crate::alert::AlertSession;

/// System-wide state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub listening: bool,
    pub crash_signals: u64,
    pub uptime_seconds: u64,
    pub session: AlertSession,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            running: false,
            listening: false,
            crash_signals: 0,
            uptime_seconds: 0,
            session: AlertSession::idle(),
        }
    }
}
