use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::{aggregate, GroupKey};
use crate::models::{AttendanceRow, ExpectedAttendance};

pub fn build_report(
    scope: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
    rows: &[AttendanceRow],
    expected: &[ExpectedAttendance],
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all tutors");

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} (check-ins from {} to {})",
        scope_label, start, end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance Mix");

    if rows.is_empty() {
        let _ = writeln!(output, "No check-ins recorded for this window.");
    } else {
        // A kind pivot always carries both kinds, even at zero.
        let by_kind = aggregate(rows, &[GroupKey::Kind]).expect("non-empty key list");
        for (kind, node) in by_kind.iter() {
            let _ = writeln!(output, "- {}: {}", kind.replace('_', " "), node.total());
        }
        let _ = writeln!(output, "- total: {}", by_kind.total());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Check-ins by Tutor");

    if rows.is_empty() {
        let _ = writeln!(output, "No check-ins recorded for this window.");
    } else {
        let by_tutor = aggregate(rows, &[GroupKey::Tutor]).expect("non-empty key list");
        for (tutor, node) in by_tutor.iter() {
            let _ = writeln!(output, "- {}: {} check-ins", tutor, node.total());
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Absences");

    if expected.is_empty() {
        let _ = writeln!(output, "No expected-attendance window requested.");
    } else {
        for entry in expected {
            let _ = writeln!(
                output,
                "- {}: attended {} of {} expected sessions ({} absences)",
                entry.student_name, entry.attended, entry.expected, entry.absences
            );
        }
    }

    output
}
