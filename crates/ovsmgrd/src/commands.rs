//! Shell command builders for Open vSwitch operations

use sonic_cfgmgr_common::shell::{self, shellquote};

/// Keep ovs-vsctl quiet on the console while still logging to syslog.
const VSCTL_QUIET: &str = "--verbose=vsctl:syslog:emer";

/// Build bridge creation command
///
/// With `pseudo` set, the bridge is created as a tagged fake bridge on top
/// of its parent.
pub fn build_add_bridge_cmd(bridge: &str, pseudo: Option<(&str, u32)>) -> String {
    match pseudo {
        Some((base, tag)) => format!(
            "{} add-br {} {} {}",
            shell::OVS_VSCTL_CMD,
            shellquote(bridge),
            shellquote(base),
            tag
        ),
        None => format!("{} add-br {}", shell::OVS_VSCTL_CMD, shellquote(bridge)),
    }
}

/// Build bridge deletion command
pub fn build_del_bridge_cmd(bridge: &str) -> String {
    format!("{} del-br {}", shell::OVS_VSCTL_CMD, shellquote(bridge))
}

/// Build bridge existence check command (exit code 0 if it exists)
pub fn build_bridge_exists_cmd(bridge: &str) -> String {
    format!("{} br-exists {}", shell::OVS_VSCTL_CMD, shellquote(bridge))
}

/// Build command printing the bridge a port belongs to
pub fn build_iface_to_bridge_cmd(port: &str) -> String {
    format!(
        "{} {} iface-to-br {}",
        shell::OVS_VSCTL_CMD,
        VSCTL_QUIET,
        shellquote(port)
    )
}

/// Build add port command
pub fn build_add_port_cmd(bridge: &str, port: &str) -> String {
    format!(
        "{} add-port {} {}",
        shell::OVS_VSCTL_CMD,
        shellquote(bridge),
        shellquote(port)
    )
}

/// Build delete port command
pub fn build_del_port_cmd(bridge: &str, port: &str) -> String {
    format!(
        "{} del-port {} {}",
        shell::OVS_VSCTL_CMD,
        shellquote(bridge),
        shellquote(port)
    )
}

/// Build set interface type command
pub fn build_set_port_type_cmd(port: &str, port_type: &str) -> String {
    format!(
        "{} set interface {} {}",
        shell::OVS_VSCTL_CMD,
        shellquote(port),
        shellquote(&format!("type={}", port_type))
    )
}

/// Build set interface options command
pub fn build_set_port_options_cmd(port: &str, options: &str) -> String {
    format!(
        "{} set interface {} {}",
        shell::OVS_VSCTL_CMD,
        shellquote(port),
        shellquote(&format!("options:{}", options))
    )
}

/// Build IPv6 enable/disable command for a bridge member
///
/// Members carry no addresses of their own while enslaved.
pub fn build_disable_ipv6_cmd(port: &str, disable: bool) -> String {
    let path = format!("/proc/sys/net/ipv6/conf/{}/disable_ipv6", port);
    format!(
        "{} {} > {}",
        shell::ECHO_CMD,
        if disable { 1 } else { 0 },
        shellquote(&path)
    )
}
