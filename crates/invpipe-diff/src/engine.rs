//! Depth-first structural diff between two JSON snapshots (spec §4.4).

use crate::rules;
use crate::types::{Category, DiffType, Severity};
use serde_json::Value;
use std::collections::BTreeSet;

/// One classified, emitted diff.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub diff_type: DiffType,
    pub field_path: String,
    pub previous_value: Option<Value>,
    pub current_value: Option<Value>,
    pub category: Category,
    pub severity: Severity,
}

/// Walks `previous` and `current`, emitting one [`FieldDiff`] per changed
/// leaf or added/removed key, each already classified via the rule table.
pub fn diff(previous: &Value, current: &Value) -> Vec<FieldDiff> {
    let mut raw = Vec::new();
    walk("", previous, current, &mut raw);

    raw.into_iter()
        .map(|(diff_type, field_path, previous_value, current_value)| {
            let (category, severity) = rules::classify(&field_path);
            FieldDiff {
                diff_type,
                field_path,
                previous_value,
                current_value,
                category,
                severity,
            }
        })
        .collect()
}

type RawEntry = (DiffType, String, Option<Value>, Option<Value>);

fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}.{segment}")
    }
}

fn walk(path: &str, previous: &Value, current: &Value, out: &mut Vec<RawEntry>) {
    if previous == current {
        return;
    }

    match (previous, current) {
        (Value::Object(prev_map), Value::Object(cur_map)) => {
            let keys: BTreeSet<&String> = prev_map.keys().chain(cur_map.keys()).collect();
            for key in keys {
                let child_path = join_path(path, key);
                match (prev_map.get(key), cur_map.get(key)) {
                    (Some(p), Some(c)) => walk(&child_path, p, c, out),
                    (Some(p), None) => out.push((DiffType::Delete, child_path, Some(p.clone()), None)),
                    (None, Some(c)) => out.push((DiffType::Create, child_path, None, Some(c.clone()))),
                    (None, None) => unreachable!("key came from one of the two maps"),
                }
            }
        }
        (Value::Array(prev_items), Value::Array(cur_items)) => {
            let overlap = prev_items.len().min(cur_items.len());
            for i in 0..overlap {
                let child_path = join_path(path, &i.to_string());
                walk(&child_path, &prev_items[i], &cur_items[i], out);
            }
            for (i, p) in prev_items.iter().enumerate().skip(overlap) {
                let child_path = join_path(path, &i.to_string());
                out.push((DiffType::Delete, child_path, Some(p.clone()), None));
            }
            for (i, c) in cur_items.iter().enumerate().skip(overlap) {
                let child_path = join_path(path, &i.to_string());
                out.push((DiffType::Create, child_path, None, Some(c.clone())));
            }
        }
        _ => {
            out.push((
                DiffType::Update,
                path.to_string(),
                Some(previous.clone()),
                Some(current.clone()),
            ));
        }
    }
}

/// Drops diffs whose `field_path` matches a volatile-path ignore pattern
/// (spec §4.4 step 3, e.g. uptime counters). Reuses the rule table's
/// prefix-matching semantics via [`rules::classify`]'s sibling matcher.
pub fn filter_significant<'a>(
    diffs: Vec<FieldDiff>,
    ignore_prefixes: &[&'a str],
) -> Vec<FieldDiff> {
    diffs
        .into_iter()
        .filter(|d| !ignore_prefixes.iter().any(|prefix| d.field_path.starts_with(prefix)))
        .collect()
}

/// Maximum severity across a batch, under the total order
/// `low < medium < high < critical` (spec §8 property 6).
pub fn max_severity(diffs: &[FieldDiff]) -> Option<Severity> {
    diffs.iter().map(|d| d.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_diff_when_identical() {
        let value = json!({"a": 1, "b": {"c": 2}});
        assert!(diff(&value, &value).is_empty());
    }

    #[test]
    fn test_scalar_update() {
        let previous = json!({"facts": {"nodes": {"1": {"version": "1.2.3"}}}});
        let current = json!({"facts": {"nodes": {"1": {"version": "1.2.4"}}}});
        let diffs = diff(&previous, &current);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Update);
        assert_eq!(diffs[0].field_path, "facts.nodes.1.version");
        assert_eq!(diffs[0].previous_value, Some(json!("1.2.3")));
        assert_eq!(diffs[0].current_value, Some(json!("1.2.4")));
        assert_eq!(diffs[0].category, Category::Os);
        assert_eq!(diffs[0].severity, Severity::High);
    }

    #[test]
    fn test_key_added_is_create_with_whole_value() {
        let previous = json!({"applications": {}});
        let current = json!({"applications": {"mail": {"version": "1.0"}}});
        let diffs = diff(&previous, &current);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Create);
        assert_eq!(diffs[0].field_path, "applications.mail");
        assert!(diffs[0].previous_value.is_none());
        assert_eq!(diffs[0].current_value, Some(json!({"version": "1.0"})));
    }

    #[test]
    fn test_key_removed_is_delete() {
        let previous = json!({"applications": {"mail": {"version": "1.0"}}});
        let current = json!({"applications": {}});
        let diffs = diff(&previous, &current);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Delete);
        assert!(diffs[0].current_value.is_none());
    }

    #[test]
    fn test_array_size_growth_emits_create_for_trailing_slot() {
        let previous = json!({"modules": ["a"]});
        let current = json!({"modules": ["a", "b"]});
        let diffs = diff(&previous, &current);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Create);
        assert_eq!(diffs[0].field_path, "modules.1");
    }

    #[test]
    fn test_filter_significant_drops_ignored_paths() {
        let diffs = vec![FieldDiff {
            diff_type: DiffType::Update,
            field_path: "facts.uptime_seconds".into(),
            previous_value: Some(json!(10)),
            current_value: Some(json!(20)),
            category: Category::Other,
            severity: Severity::Low,
        }];
        assert!(filter_significant(diffs, &["facts.uptime_seconds"]).is_empty());
    }

    #[test]
    fn test_max_severity_follows_total_order() {
        let diffs = vec![
            FieldDiff {
                diff_type: DiffType::Update,
                field_path: "a".into(),
                previous_value: None,
                current_value: None,
                category: Category::Other,
                severity: Severity::Low,
            },
            FieldDiff {
                diff_type: DiffType::Update,
                field_path: "b".into(),
                previous_value: None,
                current_value: None,
                category: Category::Network,
                severity: Severity::High,
            },
        ];
        assert_eq!(max_severity(&diffs), Some(Severity::High));
    }
}
