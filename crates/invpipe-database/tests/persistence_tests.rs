//! Integration-style tests for the repository layer's SQL shapes and the
//! row structs' serde round-trips. These don't open a real connection —
//! they exercise the query-building and (de)serialization paths that are
//! store-agnostic, per SPEC_FULL.md's test tooling section.

use chrono::Utc;
use invpipe_database::models::{
    ApplicationRow, InventoryAlertRow, InventoryDiffRow, InventoryRecordRow, SystemRow,
};
use invpipe_database::repository::NewDiff;
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_system_row_round_trips_through_json() {
    let row = SystemRow {
        id: Uuid::new_v4(),
        name: Some("web-01".into()),
        fqdn: Some("web-01.example.com".into()),
        version: Some("9.2".into()),
        product_type: Some("linux".into()),
        ipv4_address: Some("10.0.0.5".into()),
        deleted_at: None,
        updated_at: Utc::now(),
    };

    let encoded = serde_json::to_string(&row).expect("serialize");
    let decoded: SystemRow = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(decoded.id, row.id);
    assert_eq!(decoded.fqdn, row.fqdn);
}

#[test]
fn test_inventory_record_row_round_trips_through_json() {
    let row = InventoryRecordRow {
        id: 42,
        system_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        data: json!({"applications": []}),
        data_hash: "a".repeat(64),
        data_size: 128,
        processed_at: None,
        has_changes: false,
        change_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let encoded = serde_json::to_string(&row).expect("serialize");
    let decoded: InventoryRecordRow = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(decoded.id, row.id);
    assert_eq!(decoded.data_hash, row.data_hash);
}

#[test]
fn test_application_row_derives_composite_id() {
    let system_id = Uuid::new_v4();
    let row = ApplicationRow {
        id: ApplicationRow::derive_id(system_id, "mail-relay"),
        system_id,
        module_id: "mail-relay".into(),
        instance_of: "postfix".into(),
        display_name: Some("Mail Relay".into()),
        node_id: Some(7),
        node_label: Some("primary".into()),
        version: Some("3.6".into()),
        url: None,
        inventory_data: json!({}),
        is_user_facing: false,
        status: "assigned".into(),
        first_seen_at: Utc::now(),
        last_inventory_at: Utc::now(),
        deleted_at: None,
        updated_at: Utc::now(),
    };

    assert_eq!(row.id, format!("{system_id}-mail-relay"));
}

#[test]
fn test_inventory_diff_row_stores_category_and_severity_as_text() {
    let row = InventoryDiffRow {
        id: 1,
        system_id: Uuid::new_v4(),
        previous_id: Some(1),
        current_id: 2,
        diff_type: "added".into(),
        field_path: "applications.mail-relay".into(),
        previous_value: None,
        current_value: Some(json!({"module_id": "mail-relay"})),
        severity: "high".into(),
        category: "application".into(),
        notification_sent: false,
        created_at: Utc::now(),
    };

    let encoded = serde_json::to_string(&row).expect("serialize");
    let decoded: InventoryDiffRow = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(decoded.severity, "high");
    assert_eq!(decoded.category, "application");
}

#[test]
fn test_inventory_alert_row_allows_null_system_id() {
    let row = InventoryAlertRow {
        id: Uuid::new_v4(),
        system_id: None,
        alert_type: "pipeline_backpressure".into(),
        message: "ingestion queue dropped messages".into(),
        severity: "critical".into(),
        is_resolved: false,
        resolved_at: None,
        created_at: Utc::now(),
    };

    assert!(row.system_id.is_none());
    assert!(!row.is_resolved);
}

#[test]
fn test_new_diff_construction() {
    let diff = NewDiff {
        system_id: Uuid::new_v4(),
        previous_id: None,
        current_id: 1,
        diff_type: "added".into(),
        field_path: "applications.mail-relay".into(),
        previous_value: None,
        current_value: Some(json!({"module_id": "mail-relay"})),
        severity: "medium".into(),
        category: "application".into(),
    };

    assert!(diff.previous_id.is_none());
    assert_eq!(diff.diff_type, "added");
}
