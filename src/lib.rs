// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! CrashDoc - Accident Documentation and Emergency Alerting
//!
//! Crash detection and emergency alerting core with:
//! - Delta-magnitude impact detection over an accelerometer stream
//! - A cancellable confirmation countdown with siren and haptic alarm
//! - Simulated dispatch to police, ambulance and personal contacts in fixed order
//! - AI damage assessment with a graceful fallback chain
//! - Accident reports exported as JSON
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CrashDoc Engine                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  crash   ┌──────────────────────────────────┐   │
//! │  │ Motion  │ ───────► │ Alert Controller                 │   │
//! │  │ Sampler │  signal  │  Confirmation Gate → Dispatch    │   │
//! │  └─────────┘          │  Sequencer, Feedback guard       │   │
//! │                       └──────────────────────────────────┘   │
//! │                                    ↓                         │
//! │  ┌─────────────────────────────────────────────────────┐     │
//! │  │                      Event Bus                      │     │
//! │  └─────────────────────────────────────────────────────┘     │
//! │        ↓                                                     │
//! │  ┌───────────┐   ┌─────────────┐   ┌──────────────────┐      │
//! │  │ WebSocket │   │  Damage     │ → │ Accident Report  │      │
//! │  │  clients  │   │  Assessment │   │ export           │      │
//! │  └───────────┘   └─────────────┘   └──────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod alert;
pub mod assessment;
pub mod config;
pub mod core;
pub mod error;
pub mod location;
pub mod report;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use alert::{AlertController, AlertEvent, AlertHandle, AlertSession, SessionState};
pub use assessment::{AssessmentService, DamageAssessment};
pub use config::Config;
pub use core::{Engine, EventBus};
pub use error::{CrashDocError, Result};
pub use report::{AccidentReport, ReportExporter, ReportWizard};
pub use sensors::{MotionSampler, MotionSource};
pub use streaming::WebSocketServer;

/// CrashDoc version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
