//! Pivoting of raw ledger rows into nested count summaries.
//!
//! Grouping dimensions apply in caller order; group keys appear in
//! first-seen order of the input, so callers wanting sorted output sort
//! the rows first. Leaves always carry both kind counts plus a total,
//! even when one kind never occurs, so consumers never branch on key
//! absence.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::AttendanceError;
use crate::models::{AttendanceKind, AttendanceRow};

/// One grouping dimension of the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Tutor,
    Module,
    Date,
    Kind,
}

impl GroupKey {
    pub fn parse(value: &str) -> Result<Self, AttendanceError> {
        match value.to_ascii_lowercase().as_str() {
            "tutor" => Ok(GroupKey::Tutor),
            "module" => Ok(GroupKey::Module),
            "date" => Ok(GroupKey::Date),
            "type" | "kind" => Ok(GroupKey::Kind),
            other => Err(AttendanceError::InvalidArgument(format!(
                "unknown grouping key '{other}', expected tutor, module, date or type"
            ))),
        }
    }

    fn value_for(&self, row: &AttendanceRow) -> String {
        match self {
            GroupKey::Tutor => row.tutor_name.clone(),
            GroupKey::Module => row.module_name.clone(),
            GroupKey::Date => row.date.to_string(),
            GroupKey::Kind => row.kind.as_str().to_string(),
        }
    }
}

/// Leaf counter: exact integer counts split by kind, plus their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct KindCounts {
    pub in_person: u64,
    #[serde(rename = "virtual")]
    pub virtual_count: u64,
    pub total: u64,
}

impl KindCounts {
    fn tally(&mut self, kind: AttendanceKind) {
        match kind {
            AttendanceKind::InPerson => self.in_person += 1,
            AttendanceKind::Virtual => self.virtual_count += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryNode {
    Counts(KindCounts),
    Groups(Summary),
}

impl SummaryNode {
    /// Total check-ins under this node, whatever its depth.
    pub fn total(&self) -> u64 {
        match self {
            SummaryNode::Counts(counts) => counts.total,
            SummaryNode::Groups(summary) => summary.total(),
        }
    }
}

/// An insertion-ordered mapping from group key to child node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    entries: Vec<(String, SummaryNode)>,
    index: HashMap<String, usize>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&SummaryNode> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SummaryNode)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, node)| node.total()).sum()
    }

    /// Create-on-first-encounter: an unseen group starts at zero counts,
    /// never "missing".
    fn node_mut(&mut self, key: String, leaf: bool) -> &mut SummaryNode {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let node = if leaf {
                    SummaryNode::Counts(KindCounts::default())
                } else {
                    SummaryNode::Groups(Summary::default())
                };
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, node));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            match node {
                SummaryNode::Counts(counts) => map.serialize_entry(key, counts)?,
                SummaryNode::Groups(summary) => map.serialize_entry(key, summary)?,
            }
        }
        map.end()
    }
}

/// Pivot `rows` by the given grouping dimensions in a single pass.
/// An empty input yields an empty summary; an empty key list is a caller
/// error since there is nothing to group by.
pub fn aggregate(rows: &[AttendanceRow], keys: &[GroupKey]) -> Result<Summary, AttendanceError> {
    if keys.is_empty() {
        return Err(AttendanceError::InvalidArgument(
            "at least one grouping key is required".to_string(),
        ));
    }
    let mut summary = Summary::default();
    for row in rows {
        insert(&mut summary, row, keys);
    }
    Ok(summary)
}

fn insert(summary: &mut Summary, row: &AttendanceRow, keys: &[GroupKey]) {
    let (key, rest) = keys.split_first().expect("keys checked non-empty");
    if *key == GroupKey::Kind {
        // A kind-keyed level always carries both kinds, so consumers
        // never branch on key absence.
        for kind in [AttendanceKind::InPerson, AttendanceKind::Virtual] {
            summary.node_mut(kind.as_str().to_string(), rest.is_empty());
        }
    }
    match summary.node_mut(key.value_for(row), rest.is_empty()) {
        SummaryNode::Counts(counts) => counts.tally(row.kind),
        SummaryNode::Groups(inner) => insert(inner, row, rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn row(tutor: &str, module: &str, day: u32, kind: AttendanceKind) -> AttendanceRow {
        AttendanceRow {
            student_id: Uuid::new_v4(),
            student_name: "Ana Reyes".to_string(),
            tutor_name: tutor.to_string(),
            module_name: module.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            kind,
        }
    }

    fn leaf(summary: &Summary, key: &str) -> KindCounts {
        match summary.get(key).unwrap() {
            SummaryNode::Counts(counts) => *counts,
            SummaryNode::Groups(_) => panic!("expected leaf for {key}"),
        }
    }

    #[test]
    fn splits_counts_by_tutor() {
        // Two in-person for tutor A, one virtual for tutor B.
        let rows = vec![
            row("A", "algebra", 1, AttendanceKind::InPerson),
            row("A", "algebra", 2, AttendanceKind::InPerson),
            row("B", "algebra", 1, AttendanceKind::Virtual),
        ];
        let summary = aggregate(&rows, &[GroupKey::Tutor]).unwrap();
        assert_eq!(summary.iter().count(), 2);
        assert_eq!(
            leaf(&summary, "A"),
            KindCounts { in_person: 2, virtual_count: 0, total: 2 }
        );
        assert_eq!(
            leaf(&summary, "B"),
            KindCounts { in_person: 0, virtual_count: 1, total: 1 }
        );
    }

    #[test]
    fn empty_input_yields_empty_summary() {
        let summary = aggregate(&[], &[GroupKey::Tutor, GroupKey::Date]).unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn empty_key_list_is_rejected() {
        assert!(matches!(
            aggregate(&[row("A", "algebra", 1, AttendanceKind::Virtual)], &[]),
            Err(AttendanceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn keys_appear_in_first_seen_order() {
        let rows = vec![
            row("Zoe", "algebra", 1, AttendanceKind::InPerson),
            row("Ana", "algebra", 1, AttendanceKind::InPerson),
            row("Zoe", "algebra", 2, AttendanceKind::Virtual),
        ];
        let summary = aggregate(&rows, &[GroupKey::Tutor]).unwrap();
        let keys: Vec<&str> = summary.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["Zoe", "Ana"]);
    }

    #[test]
    fn nested_totals_reconcile_with_children() {
        let rows = vec![
            row("A", "algebra", 1, AttendanceKind::InPerson),
            row("A", "geometry", 1, AttendanceKind::Virtual),
            row("A", "algebra", 8, AttendanceKind::InPerson),
            row("B", "algebra", 1, AttendanceKind::Virtual),
        ];
        let summary = aggregate(&rows, &[GroupKey::Tutor, GroupKey::Module]).unwrap();
        assert_eq!(summary.total(), 4);
        for (_, node) in summary.iter() {
            if let SummaryNode::Groups(children) = node {
                assert_eq!(node.total(), children.total());
            } else {
                panic!("expected nested groups under tutors");
            }
        }
        assert_eq!(summary.get("A").unwrap().total(), 3);
        assert_eq!(summary.get("B").unwrap().total(), 1);
    }

    #[test]
    fn absent_kind_serializes_as_zero_not_missing() {
        let rows = vec![row("A", "algebra", 1, AttendanceKind::InPerson)];
        let summary = aggregate(&rows, &[GroupKey::Tutor]).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["A"]["in_person"], 1);
        assert_eq!(json["A"]["virtual"], 0);
        assert_eq!(json["A"]["total"], 1);
    }

    #[test]
    fn kind_can_be_a_grouping_dimension() {
        let rows = vec![
            row("A", "algebra", 1, AttendanceKind::InPerson),
            row("A", "algebra", 2, AttendanceKind::Virtual),
        ];
        let summary = aggregate(&rows, &[GroupKey::Kind]).unwrap();
        assert_eq!(leaf(&summary, "in_person").total, 1);
        assert_eq!(leaf(&summary, "virtual").total, 1);
    }

    #[test]
    fn kind_pivot_emits_both_kinds_even_at_zero() {
        let rows = vec![row("A", "algebra", 1, AttendanceKind::InPerson)];
        let summary = aggregate(&rows, &[GroupKey::Kind]).unwrap();
        assert_eq!(leaf(&summary, "in_person").total, 1);
        assert_eq!(
            leaf(&summary, "virtual"),
            KindCounts { in_person: 0, virtual_count: 0, total: 0 }
        );
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["virtual"]["total"], 0);
    }

    #[test]
    fn nested_kind_level_carries_both_kinds() {
        let rows = vec![row("A", "algebra", 1, AttendanceKind::Virtual)];
        let summary = aggregate(&rows, &[GroupKey::Tutor, GroupKey::Kind]).unwrap();
        let SummaryNode::Groups(by_kind) = summary.get("A").unwrap() else {
            panic!("expected nested kinds under tutor");
        };
        assert_eq!(by_kind.get("in_person").unwrap().total(), 0);
        assert_eq!(by_kind.get("virtual").unwrap().total(), 1);
    }

    #[test]
    fn grouping_key_names_parse() {
        assert_eq!(GroupKey::parse("Type").unwrap(), GroupKey::Kind);
        assert_eq!(GroupKey::parse("tutor").unwrap(), GroupKey::Tutor);
        assert!(GroupKey::parse("severity").is_err());
    }
}
