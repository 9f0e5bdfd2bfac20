use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::AnalysisPayload;

/// The analysis variant requested from the remote service.
///
/// Each variant selects its own response schema during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Financial,
    Reservation,
    Combined,
}

impl AnalysisKind {
    /// Wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Reservation => "reservation",
            Self::Combined => "combined",
        }
    }

    /// Derive the kind from which collections of the payload hold records.
    ///
    /// Both collections populated selects [`AnalysisKind::Combined`]; a
    /// single populated collection selects its own kind. Returns `None` for
    /// an empty payload.
    pub fn for_payload(payload: &AnalysisPayload) -> Option<Self> {
        match (
            payload.transactions.is_empty(),
            payload.reservations.is_empty(),
        ) {
            (false, false) => Some(Self::Combined),
            (false, true) => Some(Self::Financial),
            (true, false) => Some(Self::Reservation),
            (true, true) => None,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "financial" => Ok(Self::Financial),
            "reservation" => Ok(Self::Reservation),
            "combined" => Ok(Self::Combined),
            other => Err(format!("unknown analysis kind: {other}")),
        }
    }
}
