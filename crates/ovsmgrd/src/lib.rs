//! ovsmgrd - Open vSwitch bridge configuration manager daemon for SONiC
//!
//! Keeps Open vSwitch bridges in line with CONFIG_DB: a bridge exists once
//! its members (or its base, for tagged pseudo-bridges) are present, is
//! created on the switch once activation is requested, and tracks member
//! devices as they come and go.

mod bridge;
mod commands;
mod control_plane;
mod device;
mod link_monitor;
mod ovs_mgr;
mod port;
mod snapshot;
mod tables;
mod types;

#[cfg(test)]
mod test_support;

pub use bridge::BridgeController;
pub use commands::*;
pub use control_plane::{ControlPlane, ShellControlPlane};
pub use device::{
    Association, DeviceFramework, LinkEvent, LinkNotification, LinkTable, MemberRole,
};
pub use link_monitor::{LinkMonitor, DEFAULT_SYSFS_NET};
pub use ovs_mgr::OvsMgr;
pub use port::{BaseLink, BridgeEnv, Port};
pub use snapshot::ConfigSnapshot;
pub use tables::*;
pub use types::*;
