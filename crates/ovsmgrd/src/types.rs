//! Type definitions for ovsmgrd

use serde::Serialize;
use std::collections::BTreeMap;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult, FieldValues, FieldValuesExt};

use crate::tables::fields;

/// Bridge configuration captured from one OVS_BRIDGE entry.
///
/// Replaced wholesale on every reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeConfig {
    /// Declared member devices, in declaration order
    pub ifnames: Vec<String>,
    /// VLAN tag of a pseudo-bridge (0 = unset)
    pub tag: u32,
    /// Parent device of a pseudo-bridge
    pub base: Option<String>,
    /// Bridge may be present without any member
    pub empty: bool,
    /// Interface type applied to every attached port
    pub port_type: Option<String>,
    /// Interface options applied to every attached port
    pub options: Option<String>,
}

impl BridgeConfig {
    /// Parses the bridge attributes out of a table entry.
    ///
    /// `ovs_tag` and `ovs_base` are only honored together.
    pub fn from_fields(fvs: &FieldValues) -> CfgMgrResult<Self> {
        let mut config = BridgeConfig {
            ifnames: fvs.get_field(fields::IFNAME).map(parse_ifnames).unwrap_or_default(),
            ..Default::default()
        };

        let base = non_empty(fvs.get_field(fields::OVS_BASE));
        if let (Some(tag), Some(base)) = (fvs.get_field(fields::OVS_TAG), base) {
            config.tag = tag.trim().parse().map_err(|_| {
                CfgMgrError::invalid_config(fields::OVS_TAG, format!("'{}' is not a valid tag", tag))
            })?;
            config.base = Some(base);
        }

        if let Some(empty) = fvs.get_field(fields::OVS_EMPTY) {
            config.empty = parse_bool(empty).ok_or_else(|| {
                CfgMgrError::invalid_config(
                    fields::OVS_EMPTY,
                    format!("'{}' is not a boolean", empty),
                )
            })?;
        }

        config.port_type = non_empty(fvs.get_field(fields::OVS_TYPE));
        config.options = non_empty(fvs.get_field(fields::OVS_OPTIONS));

        Ok(config)
    }

    /// Returns `(base, tag)` when the bridge must be created as a
    /// pseudo-bridge on top of its base.
    pub fn pseudo_bridge(&self) -> Option<(&str, u32)> {
        match (&self.base, self.tag) {
            (Some(base), tag) if tag != 0 => Some((base.as_str(), tag)),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Splits a member list on commas and whitespace.
pub fn parse_ifnames(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// What a reload requires from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigChange {
    /// The new configuration was applied in place.
    Applied,
    /// The bridge has to be torn down and recreated.
    Restart,
}

/// Compares two raw entries of the same bridge.
///
/// A change confined to the member list is applied in place; any change
/// to a generic device attribute or to another bridge attribute requires
/// a restart.
pub fn diff_config(old: &FieldValues, new: &FieldValues) -> ConfigChange {
    let (old_dev, old_br) = split_attributes(old);
    let (new_dev, new_br) = split_attributes(new);

    if old_dev != new_dev || old_br != new_br {
        ConfigChange::Restart
    } else {
        ConfigChange::Applied
    }
}

type AttrMap<'a> = BTreeMap<&'a str, &'a str>;

/// Splits an entry into (device attributes, bridge attributes without ifname).
fn split_attributes(fvs: &FieldValues) -> (AttrMap<'_>, AttrMap<'_>) {
    let mut device = BTreeMap::new();
    let mut bridge = BTreeMap::new();

    for (field, value) in fvs {
        let field = field.as_str();
        if field == fields::IFNAME {
            continue;
        }
        if fields::BRIDGE_FIELDS.contains(&field) {
            bridge.insert(field, value.as_str());
        } else {
            device.insert(field, value.as_str());
        }
    }

    (device, bridge)
}

/// Activation state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    /// Not instantiated on the control plane
    Down,
    /// Activation in progress
    Activating,
    /// Instantiated and forwarding
    Up,
    /// Deactivation in progress
    Deactivating,
}

/// State of a port or base association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Underlying device missing or unusable
    Absent,
    /// Device usable but not attached to the bridge
    Present,
    /// Device claimed and attached to the bridge
    Attached,
}

impl LinkState {
    /// Returns true unless the link is absent.
    pub fn is_present(&self) -> bool {
        !matches!(self, LinkState::Absent)
    }
}

/// Where a port's membership comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipOrigin {
    /// Listed in the bridge's `ifname`
    Declared,
    /// Added at runtime through the hot-plug entry points
    Hotplug,
}

/// Snapshot of one bridge for status dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    /// Bridge name
    pub name: String,
    /// Activation state
    pub state: BridgeState,
    /// Eligible to exist
    pub present: bool,
    /// Activation requested by the device framework
    pub activation_requested: bool,
    /// Number of ports whose device is present
    pub present_ports: usize,
    /// Tracked ports, in name order
    pub ports: Vec<String>,
    /// Ports currently attached to the bridge
    pub attached_ports: Vec<String>,
    /// Base device, for pseudo-bridges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_cfgmgr_common::field_values;

    #[test]
    fn test_bridge_config_defaults() {
        let config = BridgeConfig::from_fields(&Vec::new()).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.pseudo_bridge(), None);
    }

    #[test]
    fn test_bridge_config_full() {
        let fvs = field_values! {
            "ifname" => "eth0, eth1 eth2",
            "ovs_base" => "br-core",
            "ovs_tag" => "10",
            "ovs_empty" => "true",
            "ovs_type" => "internal",
            "ovs_options" => "peer=patch0",
        };
        let config = BridgeConfig::from_fields(&fvs).unwrap();
        assert_eq!(
            config,
            BridgeConfig {
                ifnames: vec!["eth0".into(), "eth1".into(), "eth2".into()],
                tag: 10,
                base: Some("br-core".into()),
                empty: true,
                port_type: Some("internal".into()),
                options: Some("peer=patch0".into()),
            }
        );
        assert_eq!(config.pseudo_bridge(), Some(("br-core", 10)));
    }

    #[test]
    fn test_tag_without_base_is_ignored() {
        let config = BridgeConfig::from_fields(&field_values! { "ovs_tag" => "10" }).unwrap();
        assert_eq!(config.tag, 0);
        assert_eq!(config.base, None);

        let config = BridgeConfig::from_fields(&field_values! { "ovs_base" => "br-core" }).unwrap();
        assert_eq!(config.base, None);
    }

    #[test]
    fn test_zero_tag_keeps_base_but_no_pseudo_bridge() {
        let fvs = field_values! { "ovs_base" => "br-core", "ovs_tag" => "0" };
        let config = BridgeConfig::from_fields(&fvs).unwrap();
        assert_eq!(config.base.as_deref(), Some("br-core"));
        assert_eq!(config.pseudo_bridge(), None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_tag = field_values! { "ovs_base" => "br-core", "ovs_tag" => "ten" };
        assert!(matches!(
            BridgeConfig::from_fields(&bad_tag),
            Err(CfgMgrError::InvalidConfig { .. })
        ));

        let bad_empty = field_values! { "ovs_empty" => "maybe" };
        assert!(matches!(
            BridgeConfig::from_fields(&bad_empty),
            Err(CfgMgrError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_diff_member_list_only_is_applied() {
        let old = field_values! { "ifname" => "eth0", "ovs_type" => "internal" };
        let new = field_values! { "ovs_type" => "internal", "ifname" => "eth0 eth1" };
        assert_eq!(diff_config(&old, &new), ConfigChange::Applied);
    }

    #[test]
    fn test_diff_bridge_attribute_requires_restart() {
        let base = field_values! { "ifname" => "eth0" };
        for (field, value) in [
            ("ovs_tag", "10"),
            ("ovs_base", "br-core"),
            ("ovs_type", "internal"),
            ("ovs_options", "key=1"),
            ("ovs_empty", "true"),
        ] {
            let mut changed = field_values! { "ifname" => "eth0 eth1" };
            changed.push((field.to_string(), value.to_string()));
            assert_eq!(diff_config(&base, &changed), ConfigChange::Restart, "{}", field);
        }
    }

    #[test]
    fn test_diff_device_attribute_requires_restart() {
        let old = field_values! { "ifname" => "eth0", "mtu" => "1500" };
        let new = field_values! { "ifname" => "eth0", "mtu" => "9000" };
        assert_eq!(diff_config(&old, &new), ConfigChange::Restart);
    }

    #[test]
    fn test_link_state_presence() {
        assert!(!LinkState::Absent.is_present());
        assert!(LinkState::Present.is_present());
        assert!(LinkState::Attached.is_present());
    }
}
