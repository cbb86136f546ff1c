//! Diagnostics events emitted alongside every privileged operation.
//!
//! The stream is append-only and ordered per invocation. Callers use it
//! for audit and troubleshooting; error text that is unsafe to return
//! directly lands here in full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Info,
    Error,
}

/// One line of the per-invocation diagnostics stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// Unique identifier for this event.
    pub id: Uuid,
    /// When this event was emitted.
    pub ts: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
}

impl DiagnosticEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            level,
            message: message.into(),
        }
    }
}
