//! System-field derivation and application extraction from a raw inventory
//! payload (spec §4.3.1, §4.3.2). Pure functions — no I/O — so they're
//! exercised directly in unit tests without a database.

use serde_json::Value;

/// Non-null derived columns for `systems`, applied inside the record's
/// insert transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedSystemFields {
    pub name: Option<String>,
    pub fqdn: Option<String>,
    pub version: Option<String>,
    pub product_type: Option<String>,
    pub ipv4_address: Option<String>,
}

impl DerivedSystemFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.fqdn.is_none()
            && self.version.is_none()
            && self.product_type.is_none()
            && self.ipv4_address.is_none()
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(String::from)
}

/// Dispatches on the payload's top-level `installation` field (spec §4.3.1).
pub fn derive_system_fields(payload: &Value) -> DerivedSystemFields {
    match payload.get("installation").and_then(Value::as_str) {
        Some("nethserver") => derive_nethserver(payload),
        Some("nethsecurity") => derive_nethsecurity(payload),
        _ => derive_legacy(payload),
    }
}

fn derive_nethserver(payload: &Value) -> DerivedSystemFields {
    let facts = payload.get("facts");

    let name = facts
        .and_then(|f| f.get("cluster"))
        .and_then(|c| c.get("label"))
        .and_then(non_empty_str);

    let fqdn = facts
        .and_then(|f| f.get("cluster"))
        .and_then(|c| c.get("fqdn"))
        .and_then(non_empty_str);

    let ipv4_address = facts
        .and_then(|f| f.get("cluster"))
        .and_then(|c| c.get("public_ip"))
        .and_then(non_empty_str);

    let version = facts
        .and_then(|f| f.get("nodes"))
        .and_then(|nodes| nodes.get("1"))
        .and_then(|n| n.get("version"))
        .and_then(non_empty_str)
        .or_else(|| {
            facts
                .and_then(|f| f.get("nodes"))
                .and_then(Value::as_object)
                .and_then(|nodes| {
                    nodes
                        .values()
                        .find_map(|n| n.get("version").and_then(non_empty_str))
                })
        });

    DerivedSystemFields {
        name,
        fqdn,
        version,
        product_type: Some("ns8".to_string()),
        ipv4_address,
    }
}

fn derive_nethsecurity(payload: &Value) -> DerivedSystemFields {
    let version = payload
        .get("facts")
        .and_then(|f| f.get("distro"))
        .and_then(|d| d.get("version"))
        .and_then(non_empty_str);

    DerivedSystemFields {
        name: None,
        fqdn: None,
        version,
        product_type: Some("nsec".to_string()),
        ipv4_address: None,
    }
}

fn derive_legacy(payload: &Value) -> DerivedSystemFields {
    let fqdn = payload
        .get("networking")
        .and_then(|n| n.get("fqdn"))
        .and_then(non_empty_str);

    let ipv4_address = payload
        .get("networking")
        .and_then(|n| n.get("public_ip"))
        .and_then(non_empty_str)
        .or_else(|| payload.get("public_ip").and_then(non_empty_str));

    let version = payload
        .get("os")
        .and_then(|o| o.get("release"))
        .and_then(|r| r.get("full"))
        .and_then(non_empty_str);

    let product_type = payload
        .get("os")
        .and_then(|o| o.get("type"))
        .and_then(Value::as_str)
        .map(|t| match t {
            "nethserver" => "ns8".to_string(),
            "nethsecurity" => "nsec".to_string(),
            other => other.to_string(),
        });

    DerivedSystemFields {
        name: None,
        fqdn,
        version,
        product_type,
        ipv4_address,
    }
}

/// One extracted application, ready to upsert (spec §4.3.2).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedApplication {
    pub module_id: String,
    pub instance_of: String,
    pub node_id: Option<i32>,
    pub node_label: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub is_user_facing: bool,
    pub url: Option<String>,
    pub inventory_data: Value,
}

/// Module families the fleet backend considers user-facing (spec §4.3.2
/// step 3 — "implementer provides").
const USER_FACING_FAMILIES: &[&str] = &["webserver", "mail", "groupware", "vpn"];

fn is_user_facing(instance_of: &str) -> bool {
    USER_FACING_FAMILIES.contains(&instance_of)
}

fn derive_url(instance_of: &str, fqdn: &str) -> Option<String> {
    match instance_of {
        "webserver" => Some(format!("https://{fqdn}")),
        "groupware" => Some(format!("https://{fqdn}/webmail")),
        _ => None,
    }
}

/// Only meaningful for NS8 payloads; returns an empty list otherwise.
pub fn extract_applications(payload: &Value, system_fqdn: Option<&str>) -> Vec<ExtractedApplication> {
    if payload.get("installation").and_then(Value::as_str) != Some("nethserver") {
        return Vec::new();
    }

    let Some(modules) = payload
        .get("facts")
        .and_then(|f| f.get("modules"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let nodes = payload.get("facts").and_then(|f| f.get("nodes"));

    modules
        .iter()
        .filter_map(|module| {
            let module_id = module.get("id").and_then(non_empty_str)?;
            let instance_of = module.get("name").and_then(non_empty_str)?;

            let node_id = module
                .get("node")
                .and_then(|n| n.as_str().and_then(|s| s.parse::<i32>().ok()).or(n.as_i64().map(|v| v as i32)));

            let node_label = node_id.and_then(|id| {
                nodes
                    .and_then(|n| n.get(id.to_string()))
                    .and_then(|n| n.get("label"))
                    .and_then(non_empty_str)
            });

            let display_name = module.get("label").and_then(non_empty_str);
            let version = module.get("version").and_then(non_empty_str);
            let user_facing = is_user_facing(&instance_of);
            let url = match (user_facing, system_fqdn) {
                (true, Some(fqdn)) if !fqdn.is_empty() => derive_url(&instance_of, fqdn),
                _ => None,
            };

            let mut inventory_data = module.clone();
            if let Some(obj) = inventory_data.as_object_mut() {
                for key in ["id", "name", "version", "node", "label"] {
                    obj.remove(key);
                }
            }

            Some(ExtractedApplication {
                module_id,
                instance_of,
                node_id,
                node_label,
                display_name,
                version,
                is_user_facing: user_facing,
                url,
                inventory_data,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_nethserver_fields() {
        let payload = json!({
            "installation": "nethserver",
            "facts": {
                "cluster": {"label": "A", "fqdn": "a.x", "public_ip": "10.0.0.1"},
                "nodes": {"1": {"version": "1.2.3"}},
                "modules": []
            }
        });
        let derived = derive_system_fields(&payload);
        assert_eq!(derived.name.as_deref(), Some("A"));
        assert_eq!(derived.fqdn.as_deref(), Some("a.x"));
        assert_eq!(derived.ipv4_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(derived.version.as_deref(), Some("1.2.3"));
        assert_eq!(derived.product_type.as_deref(), Some("ns8"));
    }

    #[test]
    fn test_derive_nethsecurity_fields() {
        let payload = json!({"installation": "nethsecurity", "facts": {"distro": {"version": "8.1"}}});
        let derived = derive_system_fields(&payload);
        assert_eq!(derived.version.as_deref(), Some("8.1"));
        assert_eq!(derived.product_type.as_deref(), Some("nsec"));
        assert!(derived.fqdn.is_none());
    }

    #[test]
    fn test_derive_legacy_fields() {
        let payload = json!({
            "networking": {"fqdn": "legacy.x", "public_ip": "192.168.1.1"},
            "os": {"release": {"full": "7.9"}, "type": "nethserver"}
        });
        let derived = derive_system_fields(&payload);
        assert_eq!(derived.fqdn.as_deref(), Some("legacy.x"));
        assert_eq!(derived.version.as_deref(), Some("7.9"));
        assert_eq!(derived.product_type.as_deref(), Some("ns8"));
    }

    #[test]
    fn test_extract_applications_strips_fixed_keys() {
        let payload = json!({
            "installation": "nethserver",
            "facts": {
                "nodes": {"1": {"label": "primary"}},
                "modules": [
                    {"id": "mail1", "name": "mail", "version": "3.0", "node": "1", "label": "Mail", "extra": "x"}
                ]
            }
        });
        let apps = extract_applications(&payload, Some("a.x"));
        assert_eq!(apps.len(), 1);
        let app = &apps[0];
        assert_eq!(app.module_id, "mail1");
        assert_eq!(app.instance_of, "mail");
        assert_eq!(app.node_id, Some(1));
        assert_eq!(app.node_label.as_deref(), Some("primary"));
        assert!(app.is_user_facing);
        assert_eq!(app.url.as_deref(), Some("https://a.x/webmail"));
        assert_eq!(app.inventory_data, json!({"extra": "x"}));
    }

    #[test]
    fn test_extract_applications_empty_for_non_ns8() {
        let payload = json!({"installation": "nethsecurity"});
        assert!(extract_applications(&payload, None).is_empty());
    }
}
