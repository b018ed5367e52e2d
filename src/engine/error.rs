use serde::{Deserialize, Serialize};

use crate::model::Receipt;

use super::conflict::Conflict;

#[derive(Debug)]
pub enum EngineError {
    /// A referenced room, instructor, cohort, course or entry does not exist.
    NotFound { what: &'static str, id: String },
    CapacityExceeded {
        room: String,
        required: u32,
        available: u32,
    },
    ScheduleConflict(Box<Conflict>),
    /// The request breaks a rule of its activity kind or cannot be normalized.
    Invalid(String),
    LimitExceeded(&'static str),
    /// One or more import rows failed; nothing was persisted.
    BatchRejected(Vec<RowError>),
    /// The read/write layer failed. Never a business decision.
    Infrastructure(String),
}

#[derive(Debug)]
pub struct RowError {
    /// 1-based row number within the batch.
    pub row: usize,
    pub error: EngineError,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound { what, id } => write!(f, "{what} tidak ditemukan: {id}"),
            EngineError::CapacityExceeded {
                room,
                required,
                available,
            } => write!(
                f,
                "Kapasitas ruangan {room} tidak mencukupi: dibutuhkan {required} orang, kapasitas {available}"
            ),
            EngineError::ScheduleConflict(conflict) => write!(f, "{conflict}"),
            EngineError::Invalid(msg) => f.write_str(msg),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::BatchRejected(rows) => {
                write!(f, "Impor dibatalkan, {} baris bermasalah", rows.len())?;
                for row in rows {
                    write!(f, "\nBaris {}: {}", row.row, row.error)?;
                }
                Ok(())
            }
            EngineError::Infrastructure(e) => write!(f, "infrastructure error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::time::ParseError> for EngineError {
    fn from(e: crate::time::ParseError) -> Self {
        EngineError::Invalid(e.to_string())
    }
}

// ── Caller contract ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Capacity,
    Conflict,
    NotFound,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
}

impl EngineError {
    /// Business rejections map to a kind the transport can render;
    /// infrastructure faults return `None` and must be propagated.
    pub fn rejection(&self) -> Option<Rejection> {
        let kind = self.rejection_kind()?;
        Some(Rejection {
            kind,
            reason: self.to_string(),
        })
    }

    fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            EngineError::NotFound { .. } => Some(RejectionKind::NotFound),
            EngineError::CapacityExceeded { .. } => Some(RejectionKind::Capacity),
            EngineError::ScheduleConflict(_) => Some(RejectionKind::Conflict),
            EngineError::Invalid(_) | EngineError::LimitExceeded(_) => Some(RejectionKind::Invalid),
            EngineError::BatchRejected(rows) => rows
                .first()
                .and_then(|r| r.error.rejection_kind())
                .or(Some(RejectionKind::Invalid)),
            EngineError::Infrastructure(_) => None,
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, EngineError::Infrastructure(_))
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::CapacityExceeded { .. } => "capacity",
            EngineError::ScheduleConflict(_) => "conflict",
            EngineError::Invalid(_) => "invalid",
            EngineError::LimitExceeded(_) => "limit",
            EngineError::BatchRejected(_) => "batch",
            EngineError::Infrastructure(_) => "infrastructure",
        }
    }
}

/// What the engine reports back for a single mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted(Receipt),
    Rejected(Rejection),
}

impl Outcome {
    /// Fold an engine result into the caller contract. Infrastructure errors
    /// stay errors.
    pub fn from_result(result: Result<Receipt, EngineError>) -> Result<Outcome, EngineError> {
        match result {
            Ok(receipt) => Ok(Outcome::Accepted(receipt)),
            Err(e) => match e.rejection() {
                Some(rejection) => Ok(Outcome::Rejected(rejection)),
                None => Err(e),
            },
        }
    }
}
