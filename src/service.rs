//! The operations exposed to callers: registration with its limiter
//! gates, per-day attendance splits, summaries, and expected-attendance
//! analysis. Pure shaping logic lives in free functions so it can be
//! tested without a database.

use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{self, GroupKey, Summary};
use crate::calendar;
use crate::config::Config;
use crate::db;
use crate::error::{AttendanceError, Result};
use crate::fingerprint;
use crate::models::{
    AttendanceKind, AttendanceRecord, AttendanceRow, DaySplit, ExpectedAttendance, RosterEntry,
};
use crate::ratelimit::{self, LimiterStatus, StateStore};

const MAX_QUESTION_LEN: usize = 500;

/// Register a check-in: both limiter policies gate the attempt, then the
/// ledger append re-validates the one-per-day invariant. Limiter state is
/// only advanced after a successful append.
pub async fn register_attendance(
    pool: &PgPool,
    config: &Config,
    store: &StateStore,
    student_id: Uuid,
    date: NaiveDate,
    kind: AttendanceKind,
    question: Option<String>,
) -> Result<AttendanceRecord> {
    validate_question(question.as_deref())?;

    // The limiter windows track when attempts happen, not the logical
    // attendance day being registered.
    let fp = fingerprint::from_env();
    let today = chrono::Utc::now().date_naive();
    let policies = [&config.daily_cap, &config.rolling_window_cap];

    for policy in policies {
        let state = store.load(policy);
        let status = ratelimit::check_limit(policy, state.as_ref(), &fp, today);
        if !status.can_register {
            return Err(AttendanceError::RateLimited {
                policy: policy.name,
                message: status.message,
            });
        }
    }

    let record = db::append(pool, student_id, date, kind, question).await?;
    info!("registered attendance {} for {student_id} on {date}", record.id);

    for policy in policies {
        let state = ratelimit::record_registration(policy, store.load(policy), &fp, today);
        if let Err(err) = store.save(policy, &state) {
            // Limiter state is advisory; a failed write must not undo a
            // recorded check-in.
            warn!("could not persist {} state: {err}", policy.name);
        }
    }

    Ok(record)
}

/// Quota status of both policies for this device, without consuming any.
pub fn limiter_status(config: &Config, store: &StateStore, today: NaiveDate) -> Vec<(&'static str, LimiterStatus)> {
    let fp = fingerprint::from_env();
    [&config.daily_cap, &config.rolling_window_cap]
        .into_iter()
        .map(|policy| {
            let state = store.load(policy);
            (policy.name, ratelimit::check_limit(policy, state.as_ref(), &fp, today))
        })
        .collect()
}

/// Who attended on `date`, and which active students did not.
pub async fn attendance_for_date(
    pool: &PgPool,
    date: NaiveDate,
    tutor_email: Option<&str>,
) -> Result<DaySplit> {
    let attended = match tutor_email {
        Some(email) => db::query_by_date_range_and_tutor(pool, date, date, Some(email)).await?,
        None => db::query_by_date(pool, date).await?,
    };
    let roster = db::active_roster(pool, tutor_email).await?;
    Ok(split_day(date, attended, roster))
}

/// Filters narrowing a summary read. `module` and `weekday` apply in
/// memory after the range/tutor query.
#[derive(Debug, Default, Clone)]
pub struct SummaryFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tutor_email: Option<String>,
    pub module: Option<String>,
    pub weekday: Option<Weekday>,
}

pub async fn attendance_summary(
    pool: &PgPool,
    filter: &SummaryFilter,
    group_by: &[GroupKey],
) -> Result<Summary> {
    if filter.end < filter.start {
        return Err(AttendanceError::InvalidArgument(format!(
            "date range ends ({}) before it starts ({})",
            filter.end, filter.start
        )));
    }
    let rows = db::query_by_date_range_and_tutor(
        pool,
        filter.start,
        filter.end,
        filter.tutor_email.as_deref(),
    )
    .await?;
    let rows = apply_row_filters(rows, filter.module.as_deref(), filter.weekday);
    aggregate::aggregate(&rows, group_by)
}

/// Expected-vs-actual attendance for every active student across the
/// weekday occurrences of one month. The enumerated set spans the full
/// calendar month; module start/end dates do not bound it.
pub async fn expected_attendance(
    pool: &PgPool,
    year: i32,
    month: u32,
    weekday: Weekday,
    tutor_email: Option<&str>,
) -> Result<Vec<ExpectedAttendance>> {
    let dates = calendar::enumerate_weekday_dates(year, month, weekday)?;
    let (first, last) = calendar::month_bounds(year, month)?;
    let rows = db::query_by_date_range_and_tutor(pool, first, last, tutor_email).await?;
    let roster = db::active_roster(pool, tutor_email).await?;
    Ok(absences_per_student(&dates, &rows, &roster))
}

pub(crate) fn validate_question(question: Option<&str>) -> Result<()> {
    match question {
        Some(text) if text.chars().count() > MAX_QUESTION_LEN => {
            Err(AttendanceError::InvalidArgument(format!(
                "question exceeds {MAX_QUESTION_LEN} characters"
            )))
        }
        _ => Ok(()),
    }
}

pub(crate) fn split_day(
    date: NaiveDate,
    attended: Vec<AttendanceRow>,
    roster: Vec<RosterEntry>,
) -> DaySplit {
    let attended_ids: std::collections::HashSet<Uuid> =
        attended.iter().map(|row| row.student_id).collect();
    let not_attended = roster
        .into_iter()
        .filter(|entry| !attended_ids.contains(&entry.student_id))
        .collect();
    DaySplit {
        date,
        attended,
        not_attended,
    }
}

pub(crate) fn apply_row_filters(
    rows: Vec<AttendanceRow>,
    module: Option<&str>,
    weekday: Option<Weekday>,
) -> Vec<AttendanceRow> {
    rows.into_iter()
        .filter(|row| module.map_or(true, |name| row.module_name == name))
        .filter(|row| weekday.map_or(true, |day| row.date.weekday() == day))
        .collect()
}

pub(crate) fn absences_per_student(
    dates: &[NaiveDate],
    rows: &[AttendanceRow],
    roster: &[RosterEntry],
) -> Vec<ExpectedAttendance> {
    roster
        .iter()
        .map(|entry| {
            let attended = rows
                .iter()
                .filter(|row| row.student_id == entry.student_id && dates.contains(&row.date))
                .count();
            ExpectedAttendance {
                student_name: entry.student_name.clone(),
                expected: dates.len(),
                attended,
                absences: dates.len() - attended,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_entry(id: Uuid, name: &str) -> RosterEntry {
        RosterEntry {
            student_id: id,
            student_name: name.to_string(),
            tutor_name: "Lucia Fernandez".to_string(),
        }
    }

    fn attendance_row(student_id: Uuid, name: &str, day: u32) -> AttendanceRow {
        AttendanceRow {
            student_id,
            student_name: name.to_string(),
            tutor_name: "Lucia Fernandez".to_string(),
            module_name: "algebra".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            kind: AttendanceKind::InPerson,
        }
    }

    #[test]
    fn split_day_complements_against_roster() {
        let present = Uuid::new_v4();
        let absent = Uuid::new_v4();
        let split = split_day(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            vec![attendance_row(present, "Ana Reyes", 1)],
            vec![
                roster_entry(present, "Ana Reyes"),
                roster_entry(absent, "Diego Lopez"),
            ],
        );
        assert_eq!(split.attended.len(), 1);
        assert_eq!(split.not_attended.len(), 1);
        assert_eq!(split.not_attended[0].student_name, "Diego Lopez");
    }

    #[test]
    fn absences_count_only_enumerated_dates() {
        let student = Uuid::new_v4();
        // Thursdays of February 2024.
        let dates: Vec<NaiveDate> = [1, 8, 15, 22, 29]
            .iter()
            .map(|d| NaiveDate::from_ymd_opt(2024, 2, *d).unwrap())
            .collect();
        // Attended two Thursdays and one Friday; the Friday is outside
        // the enumerated set and must not count.
        let rows = vec![
            attendance_row(student, "Ana Reyes", 1),
            attendance_row(student, "Ana Reyes", 8),
            attendance_row(student, "Ana Reyes", 9),
        ];
        let result = absences_per_student(&dates, &rows, &[roster_entry(student, "Ana Reyes")]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].expected, 5);
        assert_eq!(result[0].attended, 2);
        assert_eq!(result[0].absences, 3);
    }

    #[test]
    fn student_without_records_is_fully_absent() {
        let dates = vec![NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()];
        let result =
            absences_per_student(&dates, &[], &[roster_entry(Uuid::new_v4(), "Diego Lopez")]);
        assert_eq!(result[0].absences, 1);
        assert_eq!(result[0].attended, 0);
    }

    #[test]
    fn question_limit_counts_characters_not_bytes() {
        // 400 characters of a two-byte script is 800 bytes but under
        // the 500-character limit.
        let multibyte = "ñ".repeat(400);
        assert!(validate_question(Some(&multibyte)).is_ok());

        let over = "a".repeat(MAX_QUESTION_LEN + 1);
        assert!(matches!(
            validate_question(Some(&over)),
            Err(AttendanceError::InvalidArgument(_))
        ));
        assert!(validate_question(None).is_ok());
    }

    #[test]
    fn module_and_weekday_filters_compose() {
        let student = Uuid::new_v4();
        let mut reading = attendance_row(student, "Ana Reyes", 2);
        reading.module_name = "reading".to_string();
        let rows = vec![
            attendance_row(student, "Ana Reyes", 1), // Thursday, algebra
            attendance_row(student, "Ana Reyes", 8), // Thursday, algebra
            reading,                                 // Friday, reading
        ];
        let filtered = apply_row_filters(rows.clone(), Some("algebra"), Some(Weekday::Thu));
        assert_eq!(filtered.len(), 2);
        let filtered = apply_row_filters(rows, None, Some(Weekday::Fri));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].module_name, "reading");
    }
}
