//! CONFIG_DB snapshot loaded at startup
//!
//! ```json
//! {
//!   "OVS_BRIDGE": { "br-lan": { "ifname": "eth0 eth1", "ovs_empty": true } },
//!   "OVS_BRIDGE_MEMBER": { "br-lan|tap0": {} }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult, FieldValues, KeyOpFieldsValues};

/// Table name -> key -> field -> value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
    tables: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
}

impl ConfigSnapshot {
    /// Parses a JSON snapshot.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Loads a snapshot file.
    pub fn load(path: &Path) -> CfgMgrResult<Self> {
        let file = File::open(path).map_err(|e| {
            CfgMgrError::internal(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let snapshot: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            CfgMgrError::internal(format!("Failed to parse JSON from {}: {}", path.display(), e))
        })?;

        info!(
            "Loaded {} with {} table(s)",
            path.display(),
            snapshot.tables.len()
        );
        Ok(snapshot)
    }

    /// Keys of `table`, in key order.
    pub fn keys(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// SET entries of `table`, in key order.
    pub fn entries(&self, table: &str) -> Vec<KeyOpFieldsValues> {
        let Some(entries) = self.tables.get(table) else {
            return Vec::new();
        };

        entries
            .iter()
            .map(|(key, fields)| {
                let fvs: FieldValues = fields
                    .iter()
                    .map(|(field, value)| (field.clone(), field_string(value)))
                    .collect();
                KeyOpFieldsValues::set(key.clone(), fvs)
            })
            .collect()
    }
}

/// Renders a JSON value as a table field; lists are comma-joined.
fn field_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(field_string).collect::<Vec<_>>().join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
