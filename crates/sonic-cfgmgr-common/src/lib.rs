//! Common infrastructure for SONiC configuration manager daemons.
//!
//! - [`shell`]: Safe shell command execution with proper quoting
//! - [`CfgMgr`]: Base trait for config managers
//! - [`error`]: Error types for cfgmgr operations
//! - [`reconcile`]: Keyed diff of tracked entries against a declared list
//!
//! # Architecture
//!
//! Configuration managers follow this pattern:
//!
//! 1. Subscribe to CONFIG_DB tables for configuration changes
//! 2. Monitor STATE_DB to track port/interface readiness
//! 3. Execute shell commands to configure the switch control plane
//!
//! # Example
//!
//! ```ignore
//! use sonic_cfgmgr_common::{
//!     shell::{self, OVS_VSCTL_CMD, shellquote},
//!     error::CfgMgrResult,
//! };
//!
//! async fn delete_bridge(name: &str) -> CfgMgrResult<()> {
//!     let cmd = format!("{} del-br {}", OVS_VSCTL_CMD, shellquote(name));
//!     shell::exec_or_throw(&cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod manager;
pub mod reconcile;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{CfgMgrError, CfgMgrResult};
pub use manager::{
    defaults, CfgMgr, FieldValue, FieldValues, FieldValuesExt, KeyOpFieldsValues, Operation,
};
pub use reconcile::{reconcile, Reconciliation};
