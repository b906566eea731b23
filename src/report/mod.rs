// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Accident report - guided photo capture and assessment

mod export;

pub use export::ReportExporter;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assessment::{self, AssessmentService, DamageAssessment};
use crate::error::{CrashDocError, Result};
use crate::location::{self, Location, LocationProvider};

/// One stage of the capture walk-around
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStep {
    pub id: u8,
    pub title: &'static str,
    pub description: &'static str,
}

pub const CAPTURE_STEPS: [CaptureStep; 5] = [
    CaptureStep {
        id: 1,
        title: "Front View",
        description: "Capture the entire front of your vehicle.",
    },
    CaptureStep {
        id: 2,
        title: "Rear View",
        description: "Capture the rear including license plate.",
    },
    CaptureStep {
        id: 3,
        title: "Left Side",
        description: "Capture the driver side.",
    },
    CaptureStep {
        id: 4,
        title: "Right Side",
        description: "Capture the passenger side.",
    },
    CaptureStep {
        id: 5,
        title: "Close-ups",
        description: "Take close-ups of specific damage.",
    },
];

/// A captured image on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub path: PathBuf,
    pub mime_type: String,
}

impl Photo {
    /// MIME type is inferred from the extension, defaulting to JPEG
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("heic") => "image/heic",
            Some("heif") => "image/heif",
            _ => "image/jpeg",
        };
        Self {
            path,
            mime_type: mime_type.to_string(),
        }
    }
}

/// Finished report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Photos keyed by capture step id
    pub photos: BTreeMap<u8, Photo>,
    pub analysis: DamageAssessment,
    pub location: Option<Location>,
}

impl AccidentReport {
    pub fn new(
        photos: BTreeMap<u8, Photo>,
        analysis: DamageAssessment,
        location: Option<Location>,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            id: format!("ACC-{}", timestamp.timestamp_millis()),
            timestamp,
            photos,
            analysis,
            location,
        }
    }
}

/// Walks the five capture steps; any step may be skipped
#[derive(Debug, Clone, Default)]
pub struct ReportWizard {
    current: usize,
    photos: BTreeMap<u8, Photo>,
}

impl ReportWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> &CaptureStep {
        &CAPTURE_STEPS[self.current]
    }

    pub fn is_last_step(&self) -> bool {
        self.current == CAPTURE_STEPS.len() - 1
    }

    /// Attach a photo to the current step, replacing any earlier one
    pub fn capture(&mut self, photo: Photo) {
        let id = self.current_step().id;
        self.photos.insert(id, photo);
    }

    /// Attach a photo to a step by id
    pub fn set_photo(&mut self, step: u8, photo: Photo) -> Result<()> {
        if !CAPTURE_STEPS.iter().any(|s| s.id == step) {
            return Err(CrashDocError::UnknownStep(step));
        }
        self.photos.insert(step, photo);
        Ok(())
    }

    pub fn has_photo(&self, step: u8) -> bool {
        self.photos.contains_key(&step)
    }

    /// Move to the next step; false on the last one
    pub fn next(&mut self) -> bool {
        if self.is_last_step() {
            return false;
        }
        self.current += 1;
        true
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    /// Assess the captured photos, look up the location and build the report
    pub async fn finish(
        self,
        service: Option<&dyn AssessmentService>,
        locator: &dyn LocationProvider,
        location_timeout: Duration,
    ) -> AccidentReport {
        let photos: Vec<Photo> = self.photos.values().cloned().collect();
        let analysis = assessment::assess_report(service, &photos).await;
        let location = location::locate(locator, location_timeout).await;

        let report = AccidentReport::new(self.photos, analysis, location);
        info!(
            "Report {} ready: severity {}/10, {} photos",
            report.id,
            report.analysis.severity_score,
            report.photos.len()
        );
        report
    }
}
