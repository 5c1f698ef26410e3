//! Bridge member associations: ports and the pseudo-bridge base

use std::sync::Arc;

use tracing::{debug, info, warn};

use sonic_cfgmgr_common::CfgMgrResult;

use crate::control_plane::ControlPlane;
use crate::device::DeviceFramework;
use crate::types::{BridgeConfig, LinkState, MembershipOrigin};

/// Everything a member needs from its bridge to attach or detach.
pub struct BridgeEnv {
    /// Bridge name
    pub name: String,
    /// Current bridge configuration
    pub config: BridgeConfig,
    /// Control-plane executor
    pub control: Arc<dyn ControlPlane>,
    /// Device framework handle
    pub devices: Arc<dyn DeviceFramework>,
}

/// One member device of a bridge.
#[derive(Debug, Clone)]
pub struct Port {
    device: String,
    state: LinkState,
    origin: MembershipOrigin,
}

impl Port {
    /// Creates an absent port.
    pub fn new(device: impl Into<String>, origin: MembershipOrigin) -> Self {
        Self {
            device: device.into(),
            state: LinkState::Absent,
            origin,
        }
    }

    /// Member device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Returns true while the underlying device is usable.
    pub fn is_present(&self) -> bool {
        self.state.is_present()
    }

    /// Returns true while attached to the bridge.
    pub fn is_attached(&self) -> bool {
        self.state == LinkState::Attached
    }

    /// Returns true for hot-plugged members.
    pub fn is_hotplug(&self) -> bool {
        self.origin == MembershipOrigin::Hotplug
    }

    /// Turns a declared member into a hot-plugged one.
    pub fn mark_hotplug(&mut self) {
        self.origin = MembershipOrigin::Hotplug;
    }

    /// Marks the device usable. Returns false if it already was.
    pub fn mark_present(&mut self) -> bool {
        if self.is_present() {
            return false;
        }
        self.state = LinkState::Present;
        true
    }

    /// Marks the device gone. The port must have been detached first.
    pub fn mark_absent(&mut self) {
        debug_assert!(!self.is_attached(), "{} still attached", self.device);
        self.state = LinkState::Absent;
    }

    /// Claims the device, attaches it and applies type and options.
    ///
    /// Type and option failures are only logged. On claim or attach
    /// failure the port becomes absent and the error is returned; the
    /// caller owns the present-port accounting.
    pub async fn attach(&mut self, env: &BridgeEnv) -> CfgMgrResult<()> {
        if self.state != LinkState::Present {
            return Ok(());
        }

        if let Err(e) = env.devices.claim(&self.device, &env.name) {
            warn!("Port {} of {} could not be claimed: {}", self.device, env.name, e);
            self.state = LinkState::Absent;
            return Err(e);
        }

        if let Err(e) = env.control.attach_port(&env.name, &self.device).await {
            warn!("Port {} could not be added to {}: {}", self.device, env.name, e);
            env.devices.release(&self.device, &env.name);
            self.state = LinkState::Absent;
            return Err(e);
        }

        if let Some(port_type) = &env.config.port_type {
            if let Err(e) = env.control.set_port_type(&self.device, port_type).await {
                warn!("Type {} of {} could not be set: {}", port_type, self.device, e);
            }
        }

        if let Some(options) = &env.config.options {
            if let Err(e) = env.control.set_port_options(&self.device, options).await {
                warn!("Options {} of {} could not be set: {}", options, self.device, e);
            }
        }

        self.state = LinkState::Attached;
        info!("Attached {} to {}", self.device, env.name);
        Ok(())
    }

    /// Detaches the device and releases its claim. No-op unless attached.
    pub async fn detach(&mut self, env: &BridgeEnv) {
        if !self.is_attached() {
            return;
        }

        if let Err(e) = env.control.detach_port(&env.name, &self.device).await {
            warn!("Port {} could not be removed from {}: {}", self.device, env.name, e);
        }
        env.devices.release(&self.device, &env.name);
        self.state = LinkState::Present;
        info!("Detached {} from {}", self.device, env.name);
    }
}

/// Parent device association of a pseudo-bridge.
#[derive(Debug, Clone)]
pub struct BaseLink {
    device: String,
    state: LinkState,
}

impl BaseLink {
    /// Creates an absent base link.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            state: LinkState::Absent,
        }
    }

    /// Base device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Returns true while the base device is usable.
    pub fn is_present(&self) -> bool {
        self.state.is_present()
    }

    /// Marks the device usable. Returns false if it already was.
    pub fn mark_present(&mut self) -> bool {
        if self.is_present() {
            return false;
        }
        self.state = LinkState::Present;
        true
    }

    /// Marks the device gone. The link must have been detached first.
    pub fn mark_absent(&mut self) {
        debug_assert!(self.state != LinkState::Attached, "{} still claimed", self.device);
        self.state = LinkState::Absent;
    }

    /// Claims the base device ahead of bridge creation.
    pub fn attach(&mut self, env: &BridgeEnv) -> CfgMgrResult<()> {
        if self.state != LinkState::Present {
            return Ok(());
        }

        if let Err(e) = env.devices.claim(&self.device, &env.name) {
            warn!("Base {} of {} could not be claimed: {}", self.device, env.name, e);
            self.state = LinkState::Absent;
            return Err(e);
        }

        self.state = LinkState::Attached;
        debug!("Claimed base {} for {}", self.device, env.name);
        Ok(())
    }

    /// Releases the base device. No-op unless attached.
    pub fn detach(&mut self, env: &BridgeEnv) {
        if self.state != LinkState::Attached {
            return;
        }
        env.devices.release(&self.device, &env.name);
        self.state = LinkState::Present;
    }
}
