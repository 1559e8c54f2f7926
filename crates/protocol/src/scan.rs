//! Scan verdicts.
//!
//! The agent answers every scan request with exactly one JSON object:
//!
//! ```json
//! {"status": "OK" | "INFECTED" | "ERROR", "message": "...", "details": "..."}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome category of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "INFECTED")]
    Infected,
    #[serde(rename = "ERROR")]
    Error,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Infected => "INFECTED",
            Self::Error => "ERROR",
        })
    }
}

/// Result of one scan request. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub status: ScanStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: String,
}

impl ScanResult {
    /// The scanner found nothing.
    pub fn clean(details: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Ok,
            message: "File is clean".into(),
            details: details.into(),
        }
    }

    /// The scanner reported a signature match.
    pub fn infected(details: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Infected,
            message: "Virus detected".into(),
            details: details.into(),
        }
    }

    /// No verdict could be obtained.
    pub fn error(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Error,
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.status == ScanStatus::Ok
    }

    pub fn is_infected(&self) -> bool {
        self.status == ScanStatus::Infected
    }

    pub fn is_error(&self) -> bool {
        self.status == ScanStatus::Error
    }

    /// Serializes to the single-object JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses the JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}
