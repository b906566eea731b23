// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Error types for the alerting core and its collaborators

use thiserror::Error;

/// Errors surfaced by CrashDoc library operations
#[derive(Debug, Error)]
pub enum CrashDocError {
    #[error("invalid transition: cannot {action} while {state}")]
    InvalidTransition { action: String, state: String },

    #[error("alert controller is not running")]
    ControllerStopped,

    #[error("assessment service returned HTTP {0}")]
    AssessmentHttp(u16),

    #[error("assessment service returned no text")]
    EmptyAssessment,

    #[error("assessment service not configured: {0}")]
    AssessmentUnavailable(String),

    #[error("no photos to assess")]
    NoPhotos,

    #[error("unknown capture step: {0}")]
    UnknownStep(u8),

    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("motion source error: {0}")]
    Sensor(String),

    #[error("audio output error: {0}")]
    Audio(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrashDocError {
    pub(crate) fn invalid(action: &str, state: impl std::fmt::Display) -> Self {
        CrashDocError::InvalidTransition {
            action: action.to_string(),
            state: state.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrashDocError>;
