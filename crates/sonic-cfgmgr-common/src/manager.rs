//! Configuration manager trait and common abstractions.
//!
//! A cfgmgr daemon consumes `KeyOpFieldsValues` entries from the tables it
//! subscribes to and turns them into control-plane operations.

use async_trait::async_trait;

use crate::error::CfgMgrResult;

/// Default values shared by cfgmgr daemons.
pub mod defaults {
    /// Default select timeout in milliseconds.
    pub const SELECT_TIMEOUT_MS: u64 = 1000;

    /// Separator between the components of a composite table key.
    pub const KEY_SEPARATOR: char = '|';
}

/// Operation type of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Set operation (add or update)
    Set,
    /// Delete operation
    Del,
}

impl Operation {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns the operation name as used in table notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "SET",
            Operation::Del => "DEL",
        }
    }
}

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs for a table entry.
pub type FieldValues = Vec<FieldValue>;

/// Key, operation, and field-values of one table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpFieldsValues {
    /// The key (e.g., "br-lan", "br-lan|eth0")
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: FieldValues,
}

impl KeyOpFieldsValues {
    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: FieldValues) -> Self {
        Self {
            key: key.into(),
            op: Operation::Set,
            fvs,
        }
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Del,
            fvs: Vec::new(),
        }
    }

    /// Splits a composite key `"a|b"` into its two components.
    pub fn split_key(&self) -> Option<(&str, &str)> {
        self.key
            .split_once(defaults::KEY_SEPARATOR)
            .filter(|(a, b)| !a.is_empty() && !b.is_empty())
    }
}

/// Base trait for configuration manager daemons.
///
/// # Example
///
/// ```ignore
/// use sonic_cfgmgr_common::{CfgMgr, CfgMgrResult, KeyOpFieldsValues};
///
/// struct MyMgr;
///
/// #[async_trait]
/// impl CfgMgr for MyMgr {
///     fn daemon_name(&self) -> &str { "mymgrd" }
///     fn config_table_names(&self) -> &[&str] { &["MY_TABLE"] }
///     async fn process_entry(&mut self, table: &str, entry: KeyOpFieldsValues) -> CfgMgrResult<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait CfgMgr: Send {
    /// Returns the daemon name (e.g., "ovsmgrd").
    fn daemon_name(&self) -> &str;

    /// Returns the subscribed CONFIG_DB table names.
    fn config_table_names(&self) -> &[&str];

    /// Returns the subscribed STATE_DB table names.
    fn state_table_names(&self) -> &[&str] {
        &[]
    }

    /// Processes one entry from one of the subscribed tables.
    async fn process_entry(&mut self, table: &str, entry: KeyOpFieldsValues) -> CfgMgrResult<()>;

    /// Called once per select timeout for periodic work.
    async fn on_timer(&mut self) {
        // Default: no-op
    }
}

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Gets the value for a field, returning the default if not present.
    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str;

    /// Checks if a field exists.
    fn has_field(&self, field: &str) -> bool;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        // Later entries win, as with a hash update.
        self.iter()
            .rev()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    fn has_field(&self, field: &str) -> bool {
        self.iter().any(|(f, _)| f == field)
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}
