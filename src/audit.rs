//! Audit entities recorded in the field.
//!
//! An audit is a site visit: the anomalies found, the photos and audio
//! notes taken, and optionally a floor plan with markers placed on it.
//! Everything is written locally first and flushed later by the sync
//! coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::User;
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
  Draft,
  InProgress,
  Completed,
  Reviewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Minor,
  Major,
  Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
  Structural,
  Electrical,
  Plumbing,
  Safety,
  Environmental,
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
  Pending,
  InProgress,
  Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
  Photo,
  Audio,
}

/// A photo or audio note attached to an audit or anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
  pub id: String,
  pub kind: MediaKind,
  pub filename: String,
  pub url: String,
  pub size: u64,
  pub created_at: DateTime<Utc>,
  /// Transcribed text, for audio notes
  pub transcription: Option<String>,
}

/// Marker placed on a floor plan where an anomaly was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyMarker {
  pub id: String,
  pub anomaly_id: String,
  pub x: f64,
  pub y: f64,
  pub severity: Severity,
}

/// Annotated floor plan image for a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
  pub id: String,
  pub audit_id: String,
  pub image_url: String,
  pub width: u32,
  pub height: u32,
  /// Pixels per meter, when known
  pub scale: Option<f64>,
  pub markers: Vec<AnomalyMarker>,
}

/// A defect observed during an audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
  pub id: String,
  pub audit_id: String,
  pub category: AnomalyCategory,
  pub severity: Severity,
  pub title: String,
  pub description: String,
  pub location: String,
  /// Position on the floor plan, when placed
  pub coordinates: Option<(f64, f64)>,
  pub photos: Vec<MediaFile>,
  pub audio_note: Option<MediaFile>,
  pub correction_status: CorrectionStatus,
  pub estimated_hours: Option<f64>,
  pub assigned_to: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A site inspection and everything recorded during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
  pub id: String,
  pub title: String,
  pub description: Option<String>,
  pub location: String,
  pub auditor_id: String,
  pub auditor_name: String,
  pub status: AuditStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub anomalies: Vec<Anomaly>,
  pub photos: Vec<MediaFile>,
  pub audio_notes: Vec<MediaFile>,
  pub floor_plan: Option<FloorPlan>,
  /// Signature image as a data URL, captured at completion
  pub signature: Option<String>,
  pub report_generated: bool,
}

impl Audit {
  /// Start a fresh draft audit for a site, owned by the given auditor.
  pub fn new(title: &str, location: &str, auditor: &User) -> Self {
    let now = Utc::now();
    Self {
      id: format!("audit_{}", Uuid::new_v4()),
      title: title.to_string(),
      description: None,
      location: location.to_string(),
      auditor_id: auditor.id.clone(),
      auditor_name: auditor.name.clone(),
      status: AuditStatus::Draft,
      created_at: now,
      updated_at: now,
      completed_at: None,
      anomalies: Vec::new(),
      photos: Vec::new(),
      audio_notes: Vec::new(),
      floor_plan: None,
      signature: None,
      report_generated: false,
    }
  }

  /// Record an anomaly and touch the audit's update time.
  pub fn add_anomaly(&mut self, anomaly: Anomaly) {
    self.anomalies.push(anomaly);
    self.updated_at = Utc::now();
  }
}

impl Record for Audit {
  fn record_key(&self) -> String {
    self.id.clone()
  }

  fn record_type() -> &'static str {
    "audit"
  }
}
