//! Control-plane executor for Open vSwitch bridges

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sonic_cfgmgr_common::{shell, CfgMgrResult};

use crate::commands::{
    build_add_bridge_cmd, build_add_port_cmd, build_bridge_exists_cmd, build_del_bridge_cmd,
    build_del_port_cmd, build_disable_ipv6_cmd, build_iface_to_bridge_cmd,
    build_set_port_options_cmd, build_set_port_type_cmd,
};

/// Operations the bridge controller issues against the switch.
///
/// Every call is a bounded side effect on external state; the controller
/// decides when to call and with what, never how.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates the bridge, as a tagged pseudo-bridge on `pseudo.0` when set.
    async fn create_bridge(&self, bridge: &str, pseudo: Option<(&str, u32)>) -> CfgMgrResult<()>;

    /// Deletes the bridge.
    async fn delete_bridge(&self, bridge: &str) -> CfgMgrResult<()>;

    /// Attaches a port; succeeds without change if already attached here.
    async fn attach_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()>;

    /// Detaches a port from the bridge.
    async fn detach_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()>;

    /// Sets the interface type of a port.
    async fn set_port_type(&self, port: &str, port_type: &str) -> CfgMgrResult<()>;

    /// Sets free-form interface options of a port.
    async fn set_port_options(&self, port: &str, options: &str) -> CfgMgrResult<()>;
}

/// [`ControlPlane`] backed by `ovs-vsctl`.
///
/// In dry-run mode, mutating commands are captured instead of executed and
/// queries report nothing.
#[derive(Debug, Default)]
pub struct ShellControlPlane {
    dry_run: bool,
    captured: Mutex<Vec<String>>,
}

impl ShellControlPlane {
    /// Creates an executor that runs commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor that only captures commands.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Returns true in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Commands captured so far in dry-run mode.
    pub fn captured_commands(&self) -> Vec<String> {
        self.captured.lock().clone()
    }

    /// Drops the captured commands.
    pub fn clear_captured(&self) {
        self.captured.lock().clear();
    }

    async fn run(&self, cmd: &str) -> CfgMgrResult<()> {
        if self.dry_run {
            debug!("Dry-run exec: {}", cmd);
            self.captured.lock().push(cmd.to_string());
            return Ok(());
        }

        shell::exec_or_throw(cmd).await?;
        Ok(())
    }

    /// Returns the bridge `port` is currently attached to.
    pub async fn bridge_of(&self, port: &str) -> CfgMgrResult<Option<String>> {
        if self.dry_run {
            return Ok(None);
        }

        let result = shell::exec(&build_iface_to_bridge_cmd(port)).await?;
        if !result.success() {
            return Ok(None);
        }
        Ok(result.first_line().map(str::to_string))
    }

    /// Returns true if `name` is an existing bridge.
    pub async fn is_bridge(&self, name: &str) -> CfgMgrResult<bool> {
        if self.dry_run {
            return Ok(false);
        }

        Ok(shell::exec(&build_bridge_exists_cmd(name)).await?.success())
    }

    /// Removes leftovers of a previous run for `name`.
    ///
    /// Deletes `name` if it is a bridge, otherwise detaches it from
    /// whichever bridge still holds it.
    pub async fn clear_state(&self, name: &str) -> CfgMgrResult<()> {
        if self.is_bridge(name).await? {
            info!("Removing stale bridge {}", name);
            return self.delete_bridge(name).await;
        }

        if let Some(bridge) = self.bridge_of(name).await? {
            info!("Removing stale port {} from {}", name, bridge);
            self.run(&build_del_port_cmd(&bridge, name)).await?;
        }
        Ok(())
    }

    async fn set_disable_ipv6(&self, port: &str, disable: bool) {
        if let Err(e) = self.run(&build_disable_ipv6_cmd(port, disable)).await {
            warn!("Failed to toggle IPv6 on {}: {}", port, e);
        }
    }
}

#[async_trait]
impl ControlPlane for ShellControlPlane {
    async fn create_bridge(&self, bridge: &str, pseudo: Option<(&str, u32)>) -> CfgMgrResult<()> {
        self.run(&build_add_bridge_cmd(bridge, pseudo)).await
    }

    async fn delete_bridge(&self, bridge: &str) -> CfgMgrResult<()> {
        self.run(&build_del_bridge_cmd(bridge)).await
    }

    async fn attach_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        self.set_disable_ipv6(port, true).await;

        if self.bridge_of(port).await?.as_deref() == Some(bridge) {
            debug!("{} already attached to {}", port, bridge);
            return Ok(());
        }

        self.run(&build_add_port_cmd(bridge, port)).await
    }

    async fn detach_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        self.set_disable_ipv6(port, false).await;
        self.run(&build_del_port_cmd(bridge, port)).await
    }

    async fn set_port_type(&self, port: &str, port_type: &str) -> CfgMgrResult<()> {
        self.run(&build_set_port_type_cmd(port, port_type)).await
    }

    async fn set_port_options(&self, port: &str, options: &str) -> CfgMgrResult<()> {
        self.run(&build_set_port_options_cmd(port, options)).await
    }
}
