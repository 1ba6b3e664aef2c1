//! Remote resource records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Placeholder for attributes missing from one side of a diff.
const ABSENT: &str = "<absent>";

/// The full set of named attributes describing one remote object.
///
/// A record is owned exclusively by the reconciliation step that fetched
/// it; it is never shared across steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    pub id: String,
    pub attrs: BTreeMap<String, String>,
    /// Ids of resources associated with this one (children pointing here).
    #[serde(default)]
    pub associations: Vec<String>,
}

/// One attribute-level difference between an expected and an actual record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttrDiff {
    pub attr: String,
    pub expected: String,
    pub actual: String,
}

impl ResourceRecord {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attrs: BTreeMap::new(),
            associations: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Attribute-level differences between `self` (expected) and `actual`.
    ///
    /// Association order is not significant; membership is.
    pub fn diff(&self, actual: &ResourceRecord) -> Vec<AttrDiff> {
        let mut diffs = Vec::new();

        if self.kind != actual.kind {
            diffs.push(AttrDiff {
                attr: "kind".to_string(),
                expected: self.kind.clone(),
                actual: actual.kind.clone(),
            });
        }
        if self.id != actual.id {
            diffs.push(AttrDiff {
                attr: "id".to_string(),
                expected: self.id.clone(),
                actual: actual.id.clone(),
            });
        }

        let names: BTreeSet<&str> = self
            .attrs
            .keys()
            .chain(actual.attrs.keys())
            .map(String::as_str)
            .collect();
        for name in names {
            let expected = self.attr(name).unwrap_or(ABSENT);
            let got = actual.attr(name).unwrap_or(ABSENT);
            if expected != got {
                diffs.push(AttrDiff {
                    attr: name.to_string(),
                    expected: expected.to_string(),
                    actual: got.to_string(),
                });
            }
        }

        let mut expected_assocs = self.associations.clone();
        let mut actual_assocs = actual.associations.clone();
        expected_assocs.sort();
        actual_assocs.sort();
        if expected_assocs != actual_assocs {
            diffs.push(AttrDiff {
                attr: "associations".to_string(),
                expected: expected_assocs.join(","),
                actual: actual_assocs.join(","),
            });
        }

        diffs
    }
}

/// Render diffs as a single diagnostic line.
pub fn render_attr_diffs(diffs: &[AttrDiff]) -> String {
    diffs
        .iter()
        .map(|d| format!("{} (expected '{}', got '{}')", d.attr, d.expected, d.actual))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_records_have_no_diff() {
        let record = ResourceRecord::new("bucket", "bucket1").with_attr("acl", "private");
        assert!(record.diff(&record.clone()).is_empty());
    }

    #[test]
    fn diff_reports_attr_level_changes_and_absences() {
        let expected = ResourceRecord::new("bucket", "bucket1")
            .with_attr("acl", "private")
            .with_attr("force_destroy", "false");
        let actual = ResourceRecord::new("bucket", "bucket1").with_attr("acl", "public-read");

        let diffs = expected.diff(&actual);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].attr, "acl");
        assert_eq!(diffs[0].actual, "public-read");
        assert_eq!(diffs[1].attr, "force_destroy");
        assert_eq!(diffs[1].actual, ABSENT);
    }

    #[test]
    fn association_diff_ignores_order() {
        let mut left = ResourceRecord::new("route_table", "rtb-1");
        left.associations = vec!["a".to_string(), "b".to_string()];
        let mut right = left.clone();
        right.associations.reverse();
        assert!(left.diff(&right).is_empty());

        right.associations.pop();
        let diffs = left.diff(&right);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].attr, "associations");
    }
}
