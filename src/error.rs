use chrono::NaiveDate;
use uuid::Uuid;

/// Typed failure modes for the attendance core. Callers branch on the
/// variant, never on message text. `Duplicate` and `RateLimited` are
/// expected outcomes surfaced to the user, not system faults.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("student {student_id} already has a check-in for {date}")]
    Duplicate { student_id: Uuid, date: NaiveDate },

    #[error("registration limit reached for policy '{policy}': {message}")]
    RateLimited { policy: &'static str, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
