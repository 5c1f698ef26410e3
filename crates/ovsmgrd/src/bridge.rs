//! Bridge controller: presence, activation and member reconciliation
//!
//! A bridge is *present* when it is eligible to exist and *active* once it
//! has been created on the control plane. Presence is derived from the
//! base link and the member ports:
//!
//! ```text
//! present = (base configured => base present)
//!           && (empty || force_active || present_ports > 0)
//! ```
//!
//! Presence is recomputed after every event that can change one of its
//! inputs. The bridge is activated once presence and the framework's
//! activation request both hold, and deactivated as soon as either drops.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use sonic_cfgmgr_common::{reconcile, CfgMgrError, CfgMgrResult, FieldValues};

use crate::control_plane::ControlPlane;
use crate::device::{Association, DeviceFramework, LinkEvent, MemberRole};
use crate::port::{BaseLink, BridgeEnv, Port};
use crate::types::{
    diff_config, BridgeConfig, BridgeState, BridgeStatus, ConfigChange, MembershipOrigin,
};

/// Lifecycle owner of one Open vSwitch bridge.
pub struct BridgeController {
    env: BridgeEnv,
    /// Raw entry of the last accepted configuration, for reload diffs
    raw_config: FieldValues,
    state: BridgeState,
    activation_requested: bool,
    present: bool,
    force_active: bool,
    n_present: usize,
    ports: BTreeMap<String, Port>,
    base: Option<BaseLink>,
}

impl BridgeController {
    /// Creates a controller from a raw OVS_BRIDGE entry.
    ///
    /// Nothing is associated until [`config_init`](Self::config_init) runs.
    pub fn new(
        name: impl Into<String>,
        fvs: &FieldValues,
        control: Arc<dyn ControlPlane>,
        devices: Arc<dyn DeviceFramework>,
    ) -> CfgMgrResult<Self> {
        let config = BridgeConfig::from_fields(fvs)?;
        Ok(Self {
            env: BridgeEnv {
                name: name.into(),
                config,
                control,
                devices,
            },
            raw_config: fvs.clone(),
            state: BridgeState::Down,
            activation_requested: false,
            present: false,
            force_active: false,
            n_present: 0,
            ports: BTreeMap::new(),
            base: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.env.name
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.env.config
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn is_active(&self) -> bool {
        self.state == BridgeState::Up
    }

    pub fn activation_requested(&self) -> bool {
        self.activation_requested
    }

    pub fn force_active(&self) -> bool {
        self.force_active
    }

    /// Number of ports whose device is present.
    pub fn present_port_count(&self) -> usize {
        self.n_present
    }

    pub fn port(&self, device: &str) -> Option<&Port> {
        self.ports.get(device)
    }

    /// Tracked ports, in name order.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn base(&self) -> Option<&BaseLink> {
        self.base.as_ref()
    }

    /// Applies the current configuration: empty-capability, base link and
    /// the declared port list.
    pub async fn config_init(&mut self) {
        if self.env.config.empty {
            self.force_active = true;
        }

        self.sync_base().await;
        self.sync_ports().await;
        self.refresh().await;
    }

    /// Takes a new raw configuration.
    ///
    /// A change limited to `ifname` is reconciled in place. Anything else
    /// leaves the bridge untouched and asks the caller to recreate it.
    pub async fn reload(&mut self, fvs: &FieldValues) -> CfgMgrResult<ConfigChange> {
        let config = BridgeConfig::from_fields(fvs)?;

        if diff_config(&self.raw_config, fvs) == ConfigChange::Restart {
            info!("Bridge {} needs a restart to apply its new configuration", self.name());
            return Ok(ConfigChange::Restart);
        }

        self.raw_config = fvs.clone();
        self.env.config = config;
        self.config_init().await;
        Ok(ConfigChange::Applied)
    }

    /// Records the framework's activation request and acts on it.
    pub async fn set_activation_requested(&mut self, requested: bool) -> CfgMgrResult<()> {
        self.activation_requested = requested;
        self.sync_activation().await
    }

    /// Routes a device notification to the port or base it belongs to.
    pub async fn handle_link_event(&mut self, role: MemberRole, device: &str, event: LinkEvent) {
        match role {
            MemberRole::Port => match event {
                LinkEvent::Added => self.port_added(device).await,
                LinkEvent::Removed => self.port_removed(device).await,
            },
            MemberRole::Base => {
                if self.base.as_ref().map(BaseLink::device) != Some(device) {
                    debug!("Ignoring stale base event for {} on {}", device, self.name());
                    return;
                }
                self.base_event(event).await;
            }
        }
    }

    /// Asserts that the bridge must exist before any member resolves.
    pub async fn prepare_for_hotplug(&mut self) {
        debug!("Preparing {} for hotplug", self.name());
        self.force_active = true;
        self.refresh().await;
    }

    /// Adds a member outside of configuration.
    pub async fn hotplug_add(&mut self, device: &str) {
        self.add_port(device, MembershipOrigin::Hotplug).await;
    }

    /// Removes a member outside of configuration. Returns false if unknown.
    pub async fn hotplug_remove(&mut self, device: &str) -> bool {
        if !self.ports.contains_key(device) {
            return false;
        }
        self.delete_port(device).await;
        true
    }

    /// Instantiates the bridge and attaches its present members.
    ///
    /// No-op unless the bridge is down.
    pub async fn activate(&mut self) -> CfgMgrResult<()> {
        if self.state != BridgeState::Down {
            debug!("Bridge {} is already {:?}", self.name(), self.state);
            return Ok(());
        }
        if !self.present {
            return Err(CfgMgrError::NotPresent {
                bridge: self.name().to_string(),
            });
        }

        self.state = BridgeState::Activating;
        info!("Activating bridge {}", self.name());

        // A pseudo-bridge can only be created once its parent is held.
        if let Some(base) = self.base.as_mut() {
            if let Err(e) = base.attach(&self.env) {
                self.state = BridgeState::Down;
                self.update_presence();
                return Err(e);
            }
        }

        let pseudo = self.env.config.pseudo_bridge();
        if let Err(e) = self.env.control.create_bridge(&self.env.name, pseudo).await {
            warn!("Bridge {} could not be created: {}", self.env.name, e);
            self.release_base();
            self.state = BridgeState::Down;
            return Err(e);
        }

        let mut attached = 0;
        for port in self.ports.values_mut() {
            if !port.is_present() {
                continue;
            }
            match port.attach(&self.env).await {
                Ok(()) => attached += 1,
                Err(_) => self.n_present -= 1,
            }
        }

        if attached == 0 && !self.force_active && !self.env.config.empty {
            warn!("No member of {} could be attached", self.env.name);
            if let Err(e) = self.env.control.delete_bridge(&self.env.name).await {
                warn!("Bridge {} could not be deleted: {}", self.env.name, e);
            }
            self.release_base();
            self.state = BridgeState::Down;
            self.force_active = false;
            self.update_presence();
            return Err(CfgMgrError::NoUsableMembers {
                bridge: self.env.name.clone(),
            });
        }

        self.state = BridgeState::Up;
        if let Err(e) = self.env.devices.set_active(&self.env.name, true) {
            warn!("Bridge {} was refused, rolling back: {}", self.env.name, e);
            self.deactivate().await;
            return Err(e);
        }

        info!("Bridge {} is up with {} port(s)", self.env.name, attached);
        Ok(())
    }

    /// Tears the bridge down. No-op unless the bridge is up.
    pub async fn deactivate(&mut self) {
        if self.state != BridgeState::Up {
            debug!("Bridge {} is not up", self.name());
            return;
        }

        self.state = BridgeState::Deactivating;
        info!("Deactivating bridge {}", self.env.name);

        if let Err(e) = self.env.devices.set_active(&self.env.name, false) {
            warn!("Bridge {} could not be marked inactive: {}", self.env.name, e);
        }

        for port in self.ports.values_mut() {
            port.detach(&self.env).await;
        }
        self.release_base();

        if let Err(e) = self.env.control.delete_bridge(&self.env.name).await {
            warn!("Bridge {} could not be deleted: {}", self.env.name, e);
        }
        self.state = BridgeState::Down;
    }

    /// Deactivates and drops every association.
    pub async fn shutdown(&mut self) {
        info!("Removing bridge {}", self.env.name);
        self.activation_requested = false;
        self.deactivate().await;

        if let Some(mut base) = self.base.take() {
            base.detach(&self.env);
            self.env
                .devices
                .remove_association(base.device(), &Association::base(&self.env.name));
        }

        let devices: Vec<String> = self.ports.keys().cloned().collect();
        for device in devices {
            self.delete_port(&device).await;
        }

        self.force_active = false;
        if self.present {
            self.present = false;
            self.env.devices.set_present(&self.env.name, false);
        }
    }

    /// Snapshot for status dumps.
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            name: self.env.name.clone(),
            state: self.state,
            present: self.present,
            activation_requested: self.activation_requested,
            present_ports: self.n_present,
            ports: self.ports.keys().cloned().collect(),
            attached_ports: self
                .ports
                .values()
                .filter(|port| port.is_attached())
                .map(|port| port.device().to_string())
                .collect(),
            base: self.base.as_ref().map(|base| base.device().to_string()),
        }
    }

    /// Checks the present-port count and presence against a full scan.
    pub fn verify_invariants(&self) -> CfgMgrResult<()> {
        let counted = self.ports.values().filter(|port| port.is_present()).count();
        if counted != self.n_present {
            return Err(CfgMgrError::internal(format!(
                "{}: {} present ports counted, {} tracked",
                self.env.name, counted, self.n_present
            )));
        }
        if self.present != self.compute_presence() {
            return Err(CfgMgrError::internal(format!(
                "{}: stale presence {}",
                self.env.name, self.present
            )));
        }
        Ok(())
    }

    fn compute_presence(&self) -> bool {
        if let Some(base) = &self.base {
            if !base.is_present() {
                return false;
            }
        }
        self.env.config.empty || self.force_active || self.n_present > 0
    }

    fn update_presence(&mut self) {
        let present = self.compute_presence();
        if present == self.present {
            return;
        }

        self.present = present;
        info!(
            "Bridge {} is now {}",
            self.env.name,
            if present { "present" } else { "absent" }
        );
        self.env.devices.set_present(&self.env.name, present);
    }

    async fn sync_activation(&mut self) -> CfgMgrResult<()> {
        match self.state {
            BridgeState::Down if self.activation_requested && self.present => {
                self.activate().await
            }
            BridgeState::Up if !self.activation_requested || !self.present => {
                self.deactivate().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Recomputes presence and follows up on activation.
    async fn refresh(&mut self) {
        self.update_presence();
        if let Err(e) = self.sync_activation().await {
            warn!("Bridge {} could not be activated: {}", self.env.name, e);
        }
    }

    fn release_base(&mut self) {
        if let Some(base) = self.base.as_mut() {
            base.detach(&self.env);
        }
    }

    async fn sync_base(&mut self) {
        let wanted = self.env.config.base.clone();
        if self.base.as_ref().map(BaseLink::device) == wanted.as_deref() {
            return;
        }

        if let Some(mut old) = self.base.take() {
            old.detach(&self.env);
            self.env
                .devices
                .remove_association(old.device(), &Association::base(&self.env.name));
        }

        if let Some(device) = wanted {
            debug!("Bridge {} is layered on {}", self.env.name, device);
            self.base = Some(BaseLink::new(device.as_str()));
            let present = self
                .env
                .devices
                .add_association(&device, Association::base(&self.env.name));
            if present {
                self.base_event(LinkEvent::Added).await;
            }
        }
    }

    async fn sync_ports(&mut self) {
        let plan = reconcile(
            &self.ports,
            self.env.config.ifnames.iter().cloned(),
            Port::is_hotplug,
        );
        if plan.is_empty() {
            return;
        }

        debug!(
            "Bridge {}: adding {:?}, removing {:?}",
            self.env.name, plan.added, plan.removed
        );
        for device in &plan.added {
            self.add_port(device, MembershipOrigin::Declared).await;
        }
        for device in &plan.removed {
            self.delete_port(device).await;
        }
    }

    async fn add_port(&mut self, device: &str, origin: MembershipOrigin) {
        if let Some(port) = self.ports.get_mut(device) {
            if origin == MembershipOrigin::Hotplug {
                port.mark_hotplug();
            }
            debug!("{} is already a port of {}", device, self.env.name);
            return;
        }

        self.ports
            .insert(device.to_string(), Port::new(device, origin));
        let present = self
            .env
            .devices
            .add_association(device, Association::port(&self.env.name));
        if present {
            self.port_added(device).await;
        }
    }

    /// Ensures detachment, drops the association and lets other bridges
    /// retry their claim on the device.
    async fn delete_port(&mut self, device: &str) {
        self.withdraw_port(device).await;

        let Some(port) = self.ports.remove(device) else {
            return;
        };
        self.env
            .devices
            .remove_association(port.device(), &Association::port(&self.env.name));
        info!("Removed port {} from {}", device, self.env.name);

        // Another bridge may have tried to claim the device while this
        // one still held it.
        if self.env.devices.is_present(device) {
            self.env.devices.set_present(device, false);
            self.env.devices.set_present(device, true);
        }
    }

    async fn port_added(&mut self, device: &str) {
        let Some(port) = self.ports.get_mut(device) else {
            debug!("Ignoring event for unknown port {} on {}", device, self.env.name);
            return;
        };
        if !port.mark_present() {
            debug!("Port {} of {} is already present", device, self.env.name);
            return;
        }
        self.n_present += 1;

        if self.state == BridgeState::Up {
            if port.attach(&self.env).await.is_err() {
                self.n_present -= 1;
                self.refresh().await;
            }
        } else {
            self.refresh().await;
        }
    }

    async fn port_removed(&mut self, device: &str) {
        let hotplug = match self.ports.get(device) {
            Some(port) => port.is_hotplug(),
            None => {
                debug!("Ignoring event for unknown port {} on {}", device, self.env.name);
                return;
            }
        };

        if hotplug {
            self.delete_port(device).await;
        } else {
            self.withdraw_port(device).await;
        }
    }

    /// Present -> absent transition of one port.
    async fn withdraw_port(&mut self, device: &str) {
        let Some(port) = self.ports.get_mut(device) else {
            return;
        };
        if !port.is_present() {
            return;
        }

        port.detach(&self.env).await;
        port.mark_absent();
        self.n_present -= 1;
        self.refresh().await;
    }

    async fn base_event(&mut self, event: LinkEvent) {
        let Some(base) = self.base.as_mut() else {
            return;
        };

        match event {
            LinkEvent::Added => {
                if !base.mark_present() {
                    return;
                }
            }
            LinkEvent::Removed => {
                if !base.is_present() {
                    return;
                }
                base.detach(&self.env);
                base.mark_absent();
            }
        }
        self.refresh().await;
    }
}
