use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttendanceError;

/// How the student attended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceKind {
    InPerson,
    Virtual,
}

impl AttendanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceKind::InPerson => "in_person",
            AttendanceKind::Virtual => "virtual",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AttendanceError> {
        match value.to_ascii_lowercase().as_str() {
            "in_person" | "in-person" | "presencial" => Ok(AttendanceKind::InPerson),
            "virtual" => Ok(AttendanceKind::Virtual),
            other => Err(AttendanceError::InvalidArgument(format!(
                "unknown attendance kind '{other}', expected in_person or virtual"
            ))),
        }
    }
}

/// One check-in. Created exactly once by a successful registration,
/// never mutated, never deleted.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub kind: AttendanceKind,
    pub question: Option<String>,
}

/// A ledger row joined with the student's tutor and module, the shape the
/// reporting reads work with.
#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub student_id: Uuid,
    pub student_name: String,
    pub tutor_name: String,
    pub module_name: String,
    pub date: NaiveDate,
    pub kind: AttendanceKind,
}

/// Roster entry from the student table; the complement side of the
/// attended / not-attended split.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub student_id: Uuid,
    pub student_name: String,
    pub tutor_name: String,
}

/// Attended / not-attended split for one calendar day.
#[derive(Debug, Clone)]
pub struct DaySplit {
    pub date: NaiveDate,
    pub attended: Vec<AttendanceRow>,
    pub not_attended: Vec<RosterEntry>,
}

/// Per-student expected-vs-actual attendance for a weekday/month window.
#[derive(Debug, Clone, Serialize)]
pub struct ExpectedAttendance {
    pub student_name: String,
    pub expected: usize,
    pub attended: usize,
    pub absences: usize,
}
