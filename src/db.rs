use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AttendanceError;
use crate::models::{AttendanceKind, AttendanceRecord, AttendanceRow, RosterEntry};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Append one check-in for `(student_id, date)`.
///
/// The existence query is a fast path only; the unique index on
/// `(student_id, attended_on)` is what actually closes the race between
/// two concurrent appends, and its violation maps to the same
/// `Duplicate` outcome.
pub async fn append(
    pool: &PgPool,
    student_id: Uuid,
    date: NaiveDate,
    kind: AttendanceKind,
    question: Option<String>,
) -> Result<AttendanceRecord, AttendanceError> {
    if query_by_student_and_date(pool, student_id, date)
        .await?
        .is_some()
    {
        return Err(AttendanceError::Duplicate { student_id, date });
    }

    let record = AttendanceRecord {
        id: Uuid::new_v4(),
        student_id,
        date,
        kind,
        question,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO tutoring.attendance_records (id, student_id, attended_on, kind, question)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(record.id)
    .bind(record.student_id)
    .bind(record.date)
    .bind(record.kind.as_str())
    .bind(record.question.as_deref())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(record),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(AttendanceError::Duplicate { student_id, date })
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn query_by_student_and_date(
    pool: &PgPool,
    student_id: Uuid,
    date: NaiveDate,
) -> Result<Option<AttendanceRecord>, AttendanceError> {
    let row = sqlx::query(
        "SELECT id, student_id, attended_on, kind, question \
         FROM tutoring.attendance_records \
         WHERE student_id = $1 AND attended_on = $2",
    )
    .bind(student_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(AttendanceRecord {
            id: row.get("id"),
            student_id: row.get("student_id"),
            date: row.get("attended_on"),
            kind: AttendanceKind::parse(row.get("kind"))?,
            question: row.get("question"),
        })
    })
    .transpose()
}

pub async fn query_by_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<AttendanceRow>, AttendanceError> {
    query_by_date_range_and_tutor(pool, date, date, None).await
}

/// The reporting read path: ledger rows in `[start, end]` joined with the
/// student's tutor and module, optionally narrowed to one tutor.
pub async fn query_by_date_range_and_tutor(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
    tutor_email: Option<&str>,
) -> Result<Vec<AttendanceRow>, AttendanceError> {
    let mut query = String::from(
        "SELECT a.student_id, a.attended_on, a.kind, \
         s.full_name AS student_name, t.full_name AS tutor_name, m.name AS module_name \
         FROM tutoring.attendance_records a \
         JOIN tutoring.students s ON s.id = a.student_id \
         JOIN tutoring.tutors t ON t.id = s.tutor_id \
         JOIN tutoring.modules m ON m.id = s.module_id \
         WHERE a.attended_on >= $1 AND a.attended_on <= $2",
    );
    if tutor_email.is_some() {
        query.push_str(" AND t.email = $3");
    }
    query.push_str(" ORDER BY a.attended_on, s.full_name");

    let mut rows = sqlx::query(&query).bind(start).bind(end);
    if let Some(email) = tutor_email {
        rows = rows.bind(email);
    }

    let mut records = Vec::new();
    for row in rows.fetch_all(pool).await? {
        records.push(AttendanceRow {
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            tutor_name: row.get("tutor_name"),
            module_name: row.get("module_name"),
            date: row.get("attended_on"),
            kind: AttendanceKind::parse(row.get("kind"))?,
        });
    }
    Ok(records)
}

/// Active students, optionally narrowed to one tutor. The complement of a
/// day's check-ins against this roster gives the not-attended list.
pub async fn active_roster(
    pool: &PgPool,
    tutor_email: Option<&str>,
) -> Result<Vec<RosterEntry>, AttendanceError> {
    let mut query = String::from(
        "SELECT s.id, s.full_name AS student_name, t.full_name AS tutor_name \
         FROM tutoring.students s \
         JOIN tutoring.tutors t ON t.id = s.tutor_id \
         WHERE s.active",
    );
    if tutor_email.is_some() {
        query.push_str(" AND t.email = $1");
    }
    query.push_str(" ORDER BY s.full_name");

    let mut rows = sqlx::query(&query);
    if let Some(email) = tutor_email {
        rows = rows.bind(email);
    }

    Ok(rows
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| RosterEntry {
            student_id: row.get("id"),
            student_name: row.get("student_name"),
            tutor_name: row.get("tutor_name"),
        })
        .collect())
}

pub async fn find_student_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Uuid>, AttendanceError> {
    let row = sqlx::query("SELECT id FROM tutoring.students WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let tutors = vec![
        (
            Uuid::parse_str("7b1c8a9e-51d2-4f0a-9a6d-2c3e1f8b4a70")?,
            "Lucia Fernandez",
            "lucia.fernandez@tutoring.example",
        ),
        (
            Uuid::parse_str("e4a2d6c1-8f3b-4b7e-b1a9-5d0c7e2f9a31")?,
            "Marco Silva",
            "marco.silva@tutoring.example",
        ),
    ];

    for (id, name, email) in &tutors {
        sqlx::query(
            r#"
            INSERT INTO tutoring.tutors (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let modules = vec![
        (Uuid::parse_str("0f5e7d2a-6b4c-4e8f-a1d3-9c2b8e6f4a50")?, "algebra"),
        (Uuid::parse_str("3c9a1b7f-2e5d-4a6c-8f0b-1d4e7a9c2b63")?, "reading"),
    ];

    for (id, name) in &modules {
        sqlx::query(
            r#"
            INSERT INTO tutoring.modules (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (
            "ana.reyes@student.example",
            "Ana Reyes",
            tutors[0].0,
            modules[0].0,
        ),
        (
            "diego.lopez@student.example",
            "Diego Lopez",
            tutors[0].0,
            modules[1].0,
        ),
        (
            "sofia.castro@student.example",
            "Sofia Castro",
            tutors[1].0,
            modules[0].0,
        ),
    ];

    for (email, name, tutor_id, module_id) in students {
        sqlx::query(
            r#"
            INSERT INTO tutoring.students (id, full_name, email, tutor_id, module_id, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                tutor_id = EXCLUDED.tutor_id,
                module_id = EXCLUDED.module_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(tutor_id)
        .bind(module_id)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Bulk-load historical check-ins. Rows whose `(student, date)` key is
/// already present are skipped, not errors.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<(usize, usize)> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_email: String,
        date: NaiveDate,
        kind: String,
        question: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let student_id = find_student_by_email(pool, &row.student_email)
            .await?
            .with_context(|| format!("unknown student email {}", row.student_email))?;
        let kind = AttendanceKind::parse(&row.kind)
            .map_err(|err| anyhow::anyhow!("{err}"))?;

        let result = sqlx::query(
            r#"
            INSERT INTO tutoring.attendance_records (id, student_id, attended_on, kind, question)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, attended_on) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(row.date)
        .bind(kind.as_str())
        .bind(row.question.as_deref())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    Ok((inserted, skipped))
}
