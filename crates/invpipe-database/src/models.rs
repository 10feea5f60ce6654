//! Row structs for the five tables this pipeline touches (spec §3).
//!
//! Each follows the teacher's `COLUMNS` constant convention so repository
//! queries never `SELECT *`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `systems` — the pipeline only ever writes the columns named in spec §3;
/// every other column on this table belongs to other parts of the backend.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SystemRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub fqdn: Option<String>,
    pub version: Option<String>,
    #[sqlx(rename = "type")]
    pub product_type: Option<String>,
    pub ipv4_address: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SystemRow {
    pub const COLUMNS: &'static str =
        "id, name, fqdn, version, type, ipv4_address, deleted_at, updated_at";
}

/// `inventory_records`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct InventoryRecordRow {
    pub id: i64,
    pub system_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub data_hash: String,
    pub data_size: i64,
    pub processed_at: Option<DateTime<Utc>>,
    pub has_changes: bool,
    pub change_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecordRow {
    pub const COLUMNS: &'static str = "id, system_id, timestamp, data, data_hash, data_size, \
         processed_at, has_changes, change_count, created_at, updated_at";
}

/// `inventory_diffs`. `diff_type`, `severity`, `category` are stored as text
/// and parsed/formatted at the worker boundary (see `invpipe-diff`) so this
/// crate has no dependency on the diff engine's enums.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct InventoryDiffRow {
    pub id: i64,
    pub system_id: Uuid,
    pub previous_id: Option<i64>,
    pub current_id: i64,
    pub diff_type: String,
    pub field_path: String,
    pub previous_value: Option<serde_json::Value>,
    pub current_value: Option<serde_json::Value>,
    pub severity: String,
    pub category: String,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl InventoryDiffRow {
    pub const COLUMNS: &'static str = "id, system_id, previous_id, current_id, diff_type, \
         field_path, previous_value, current_value, severity, category, notification_sent, created_at";
}

/// `applications`, primary key `"{system_id}-{module_id}"` (spec §3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApplicationRow {
    pub id: String,
    pub system_id: Uuid,
    pub module_id: String,
    pub instance_of: String,
    pub display_name: Option<String>,
    pub node_id: Option<i32>,
    pub node_label: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub inventory_data: serde_json::Value,
    pub is_user_facing: bool,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_inventory_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    pub const COLUMNS: &'static str = "id, system_id, module_id, instance_of, display_name, \
         node_id, node_label, version, url, inventory_data, is_user_facing, status, \
         first_seen_at, last_inventory_at, deleted_at, updated_at";

    pub fn derive_id(system_id: Uuid, module_id: &str) -> String {
        format!("{system_id}-{module_id}")
    }
}

/// `inventory_alerts` — operational alerts, distinct from diffs, pruned by
/// the cleanup worker's 30-day resolved-alert rule.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct InventoryAlertRow {
    pub id: Uuid,
    pub system_id: Option<Uuid>,
    pub alert_type: String,
    pub message: String,
    pub severity: String,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InventoryAlertRow {
    pub const COLUMNS: &'static str =
        "id, system_id, alert_type, message, severity, is_resolved, resolved_at, created_at";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_derived_id() {
        let system_id = Uuid::nil();
        assert_eq!(
            ApplicationRow::derive_id(system_id, "mail"),
            format!("{system_id}-mail")
        );
    }
}
