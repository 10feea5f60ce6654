//! Scenario-level tests for the pure derivation/diff path. These exercise
//! `invpipe-workers::derive` and `invpipe-diff` together without a database
//! or queue, covering the parts of spec §8's scenarios that don't require
//! live infrastructure.

use invpipe_diff::{diff, filter_significant, max_severity, Category, DiffType, Severity};
use invpipe_workers::derive::{derive_system_fields, extract_applications};
use serde_json::json;

fn snapshot(version: &str, modules: serde_json::Value) -> serde_json::Value {
    json!({
        "installation": "nethserver",
        "facts": {
            "cluster": {"label": "A", "fqdn": "a.x", "public_ip": "10.0.0.1"},
            "nodes": {"1": {"version": version}},
            "modules": modules
        }
    })
}

/// S1: the same payload ingested twice derives identical system fields both
/// times, so the repository's dedup key (system_id, data_hash) is what does
/// the actual work of collapsing replays into one row.
#[test]
fn s1_identical_payload_derives_identical_system_fields() {
    let payload = snapshot("1.2.3", json!([]));
    let first = derive_system_fields(&payload);
    let second = derive_system_fields(&payload);
    assert_eq!(first, second);
    assert_eq!(first.name.as_deref(), Some("A"));
    assert_eq!(first.product_type.as_deref(), Some("ns8"));
}

/// S2: diffing a snapshot against itself yields nothing, matching the "no
/// predecessor" path where the diff worker marks the record processed with
/// zero diffs rather than running the engine at all.
#[test]
fn s2_no_predecessor_means_no_diffs_to_compute() {
    let payload = snapshot("1.2.3", json!([]));
    let diffs = diff(&payload, &payload);
    assert!(diffs.is_empty());
}

/// S3: bumping a node's version produces a single high-severity update
/// classified as `os`, matching the rule table's `facts.nodes[*].version`
/// entry.
#[test]
fn s3_node_version_bump_is_a_high_severity_os_update() {
    let previous = snapshot("1.2.3", json!([]));
    let current = snapshot("1.2.4", json!([]));
    let diffs = diff(&previous, &current);
    let significant = filter_significant(diffs, &["facts.timestamp"]);

    assert_eq!(significant.len(), 1);
    let d = &significant[0];
    assert_eq!(d.diff_type, DiffType::Update);
    assert_eq!(d.field_path, "facts.nodes.1.version");
    assert_eq!(d.previous_value, Some(json!("1.2.3")));
    assert_eq!(d.current_value, Some(json!("1.2.4")));
    assert_eq!(d.category, Category::Os);
    assert_eq!(d.severity, Severity::High);
    assert_eq!(max_severity(&significant), Some(Severity::High));
}

/// S4: a module dropping out of the modules array is visible to the
/// application-extraction step as a module id no longer present in the
/// latest snapshot, which is exactly the set the batch writer passes to
/// `soft_delete_missing`.
#[test]
fn s4_dropped_module_is_absent_from_extraction() {
    let first = snapshot(
        "1.2.3",
        json!([
            {"id": "m1", "name": "mail"},
            {"id": "m2", "name": "webserver"}
        ]),
    );
    let second = snapshot("1.2.3", json!([{"id": "m1", "name": "mail"}]));

    let first_ids: Vec<_> = extract_applications(&first, Some("a.x"))
        .into_iter()
        .map(|a| a.module_id)
        .collect();
    let second_ids: Vec<_> = extract_applications(&second, Some("a.x"))
        .into_iter()
        .map(|a| a.module_id)
        .collect();

    assert_eq!(first_ids, vec!["m1".to_string(), "m2".to_string()]);
    assert_eq!(second_ids, vec!["m1".to_string()]);
    assert!(!second_ids.contains(&"m2".to_string()));
}
