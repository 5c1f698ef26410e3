//! Table name constants for ovsmgrd

/// CONFIG_DB OVS bridge table name
pub const CFG_OVS_BRIDGE_TABLE_NAME: &str = "OVS_BRIDGE";

/// CONFIG_DB hot-plugged bridge member table name (key: "bridge|device")
pub const CFG_OVS_BRIDGE_MEMBER_TABLE_NAME: &str = "OVS_BRIDGE_MEMBER";

/// STATE_DB PORT table name
pub const STATE_PORT_TABLE_NAME: &str = "PORT_TABLE";

/// Field names
pub mod fields {
    /// Ordered member device list
    pub const IFNAME: &str = "ifname";

    /// Parent device of a pseudo-bridge
    pub const OVS_BASE: &str = "ovs_base";

    /// VLAN tag of a pseudo-bridge
    pub const OVS_TAG: &str = "ovs_tag";

    /// Bridge may exist without members
    pub const OVS_EMPTY: &str = "ovs_empty";

    /// Per-port interface type
    pub const OVS_TYPE: &str = "ovs_type";

    /// Per-port interface options
    pub const OVS_OPTIONS: &str = "ovs_options";

    /// Bridge-level fields; every other field is a generic device attribute.
    pub const BRIDGE_FIELDS: &[&str] = &[IFNAME, OVS_BASE, OVS_TAG, OVS_EMPTY, OVS_TYPE, OVS_OPTIONS];
}
