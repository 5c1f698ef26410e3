//! OvsMgr - Open vSwitch bridge configuration manager

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, instrument, warn};

use sonic_cfgmgr_common::{
    CfgMgr, CfgMgrError, CfgMgrResult, FieldValues, KeyOpFieldsValues, Operation,
};

use crate::bridge::BridgeController;
use crate::control_plane::ControlPlane;
use crate::device::{DeviceFramework, LinkNotification};
use crate::tables::{
    CFG_OVS_BRIDGE_MEMBER_TABLE_NAME, CFG_OVS_BRIDGE_TABLE_NAME, STATE_PORT_TABLE_NAME,
};
use crate::types::{BridgeStatus, ConfigChange};

/// OvsMgr manages Open vSwitch bridges
///
/// Configuration flow:
/// 1. OVS_BRIDGE table → bridge controllers (create, reload, restart, remove)
/// 2. OVS_BRIDGE_MEMBER table → hot-plugged bridge members
/// 3. PORT_TABLE (STATE_DB) → device presence in the framework
/// 4. Framework notifications → the controller owning the association
pub struct OvsMgr {
    /// Bridge controllers keyed by bridge name
    bridges: BTreeMap<String, BridgeController>,

    /// Control-plane executor shared by all bridges
    control: Arc<dyn ControlPlane>,

    /// Device framework shared by all bridges
    devices: Arc<dyn DeviceFramework>,

    /// Receiving end of the framework's notification queue
    events: UnboundedReceiver<LinkNotification>,

    /// Request activation of every bridge as soon as it is configured
    auto_activate: bool,
}

impl OvsMgr {
    /// Creates a new OvsMgr instance
    pub fn new(
        control: Arc<dyn ControlPlane>,
        devices: Arc<dyn DeviceFramework>,
        events: UnboundedReceiver<LinkNotification>,
    ) -> Self {
        Self {
            bridges: BTreeMap::new(),
            control,
            devices,
            events,
            auto_activate: true,
        }
    }

    /// Enables or disables activation requests on configuration
    pub fn with_auto_activate(mut self, enabled: bool) -> Self {
        self.auto_activate = enabled;
        self
    }

    /// Returns the controller of `name`
    pub fn bridge(&self, name: &str) -> Option<&BridgeController> {
        self.bridges.get(name)
    }

    /// Names of all configured bridges
    pub fn bridge_names(&self) -> Vec<String> {
        self.bridges.keys().cloned().collect()
    }

    /// Status of every bridge, in name order
    pub fn status(&self) -> Vec<BridgeStatus> {
        self.bridges.values().map(BridgeController::status).collect()
    }

    /// Member and base devices whose presence comes from outside.
    ///
    /// Bases that are bridges managed here are left out; their presence
    /// is driven by their own controller.
    pub fn monitored_devices(&self) -> Vec<String> {
        let mut devices = BTreeSet::new();
        for bridge in self.bridges.values() {
            devices.extend(bridge.ports().map(|port| port.device().to_string()));
            if let Some(base) = bridge.base() {
                if !self.bridges.contains_key(base.device()) {
                    devices.insert(base.device().to_string());
                }
            }
        }
        devices.into_iter().collect()
    }

    /// Routes queued framework notifications to their bridges.
    ///
    /// Notifications raised while handling are processed in the same call.
    /// Returns the number of notifications taken off the queue.
    pub async fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notification) = self.events.try_recv() {
            handled += 1;
            let LinkNotification {
                association,
                device,
                event,
            } = notification;

            let Some(bridge) = self.bridges.get_mut(&association.bridge) else {
                debug!(
                    "No bridge {} for {:?} event on {}",
                    association.bridge, event, device
                );
                continue;
            };

            debug!(
                "Routing {:?} of {} to {} as {:?}",
                event, device, association.bridge, association.role
            );
            bridge
                .handle_link_event(association.role, &device, event)
                .await;
            debug_assert!(
                bridge.verify_invariants().is_ok(),
                "{:?}",
                bridge.verify_invariants()
            );
        }
        handled
    }

    /// Process OVS_BRIDGE SET operation
    #[instrument(skip(self, values))]
    pub async fn process_bridge_set(&mut self, name: &str, values: &FieldValues) -> CfgMgrResult<()> {
        self.drain_events().await;

        if !self.bridges.contains_key(name) {
            self.create_bridge(name, values, self.auto_activate).await?;
            self.drain_events().await;
            return Ok(());
        }

        let change = self
            .bridges
            .get_mut(name)
            .ok_or_else(|| CfgMgrError::bridge_not_found(name))?
            .reload(values)
            .await?;

        if change == ConfigChange::Restart {
            self.recreate_bridge(name, values).await?;
        }
        self.drain_events().await;
        Ok(())
    }

    /// Process OVS_BRIDGE DEL operation
    #[instrument(skip(self))]
    pub async fn process_bridge_del(&mut self, name: &str) -> CfgMgrResult<()> {
        self.drain_events().await;

        let Some(mut bridge) = self.bridges.remove(name) else {
            warn!("Bridge {} is not configured", name);
            return Ok(());
        };
        bridge.shutdown().await;
        self.drain_events().await;

        info!("Removed bridge {}", name);
        Ok(())
    }

    /// Process OVS_BRIDGE_MEMBER SET operation
    #[instrument(skip(self))]
    pub async fn process_member_set(&mut self, name: &str, device: &str) -> CfgMgrResult<()> {
        let bridge = self
            .bridges
            .get_mut(name)
            .ok_or_else(|| CfgMgrError::bridge_not_found(name))?;

        bridge.prepare_for_hotplug().await;
        bridge.hotplug_add(device).await;
        self.drain_events().await;

        info!("Hot-plugged {} into {}", device, name);
        Ok(())
    }

    /// Process OVS_BRIDGE_MEMBER DEL operation
    #[instrument(skip(self))]
    pub async fn process_member_del(&mut self, name: &str, device: &str) -> CfgMgrResult<()> {
        let Some(bridge) = self.bridges.get_mut(name) else {
            warn!("Bridge {} is not configured, ignoring removal of {}", name, device);
            return Ok(());
        };

        if !bridge.hotplug_remove(device).await {
            warn!("{} is not a member of {}", device, name);
            return Ok(());
        }
        self.drain_events().await;

        info!("Hot-unplugged {} from {}", device, name);
        Ok(())
    }

    /// Process PORT_TABLE SET/DEL: the device appeared or went away
    #[instrument(skip(self))]
    pub async fn process_port_state(&mut self, device: &str, present: bool) -> CfgMgrResult<()> {
        if self.bridges.contains_key(device) {
            debug!("Ignoring port state of managed bridge {}", device);
            return Ok(());
        }

        self.devices.set_present(device, present);
        self.drain_events().await;
        Ok(())
    }

    /// Requests or withdraws activation of one bridge
    #[instrument(skip(self))]
    pub async fn set_activation(&mut self, name: &str, up: bool) -> CfgMgrResult<()> {
        let bridge = self
            .bridges
            .get_mut(name)
            .ok_or_else(|| CfgMgrError::bridge_not_found(name))?;

        let result = bridge.set_activation_requested(up).await;
        self.drain_events().await;
        result
    }

    /// Tears down every bridge
    pub async fn shutdown(&mut self) {
        let names = self.bridge_names();
        for name in names {
            if let Err(e) = self.process_bridge_del(&name).await {
                warn!("Failed to remove bridge {}: {}", name, e);
            }
        }
    }

    async fn create_bridge(
        &mut self,
        name: &str,
        values: &FieldValues,
        activate: bool,
    ) -> CfgMgrResult<()> {
        let mut bridge =
            BridgeController::new(name, values, self.control.clone(), self.devices.clone())?;
        bridge.config_init().await;
        info!("Configured bridge {}", name);

        if activate {
            if let Err(e) = bridge.set_activation_requested(true).await {
                warn!("Bridge {} is not up yet: {}", name, e);
            }
        }

        self.bridges.insert(name.to_string(), bridge);
        Ok(())
    }

    /// Replaces a bridge whose new configuration cannot be applied in place.
    async fn recreate_bridge(&mut self, name: &str, values: &FieldValues) -> CfgMgrResult<()> {
        let mut old = self
            .bridges
            .remove(name)
            .ok_or_else(|| CfgMgrError::bridge_not_found(name))?;
        let requested = old.activation_requested();

        info!("Recreating bridge {}", name);
        old.shutdown().await;
        drop(old);
        self.drain_events().await;

        self.create_bridge(name, values, requested).await
    }
}

/// CfgMgr trait implementation
#[async_trait]
impl CfgMgr for OvsMgr {
    fn daemon_name(&self) -> &str {
        "ovsmgrd"
    }

    fn config_table_names(&self) -> &[&str] {
        &[CFG_OVS_BRIDGE_TABLE_NAME, CFG_OVS_BRIDGE_MEMBER_TABLE_NAME]
    }

    fn state_table_names(&self) -> &[&str] {
        &[STATE_PORT_TABLE_NAME]
    }

    async fn process_entry(&mut self, table: &str, entry: KeyOpFieldsValues) -> CfgMgrResult<()> {
        match (table, entry.op) {
            (CFG_OVS_BRIDGE_TABLE_NAME, Operation::Set) => {
                self.process_bridge_set(&entry.key, &entry.fvs).await
            }
            (CFG_OVS_BRIDGE_TABLE_NAME, Operation::Del) => self.process_bridge_del(&entry.key).await,
            (CFG_OVS_BRIDGE_MEMBER_TABLE_NAME, op) => {
                let Some((name, device)) = entry.split_key() else {
                    return Err(CfgMgrError::invalid_config(
                        "key",
                        format!("'{}' is not <bridge>|<device>", entry.key),
                    ));
                };
                if op.is_set() {
                    self.process_member_set(name, device).await
                } else {
                    self.process_member_del(name, device).await
                }
            }
            (STATE_PORT_TABLE_NAME, op) => self.process_port_state(&entry.key, op.is_set()).await,
            _ => {
                debug!("Ignoring {} entry {} from {}", entry.op.as_str(), entry.key, table);
                Ok(())
            }
        }
    }

    async fn on_timer(&mut self) {
        let handled = self.drain_events().await;
        if handled > 0 {
            debug!("Handled {} link notification(s)", handled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LinkTable;
    use crate::test_support::{ControlPlaneCall, RecordingControlPlane};
    use crate::types::BridgeState;
    use pretty_assertions::assert_eq;
    use sonic_cfgmgr_common::field_values;

    fn new_mgr() -> (OvsMgr, Arc<RecordingControlPlane>, Arc<LinkTable>) {
        let control = Arc::new(RecordingControlPlane::default());
        let (table, events) = LinkTable::new();
        let table = Arc::new(table);
        let mgr = OvsMgr::new(control.clone(), table.clone(), events);
        (mgr, control, table)
    }

    fn creates(control: &RecordingControlPlane) -> Vec<ControlPlaneCall> {
        control
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ControlPlaneCall::CreateBridge(..)))
            .collect()
    }

    #[test]
    fn test_table_names() {
        let (mgr, _, _) = new_mgr();
        assert_eq!(mgr.daemon_name(), "ovsmgrd");
        assert_eq!(mgr.config_table_names(), &["OVS_BRIDGE", "OVS_BRIDGE_MEMBER"]);
        assert_eq!(mgr.state_table_names(), &["PORT_TABLE"]);
    }

    #[tokio::test]
    async fn test_bridge_comes_up_with_its_port() {
        let (mut mgr, control, _) = new_mgr();
        mgr.process_bridge_set("br-lan", &field_values! { "ifname" => "eth0" })
            .await
            .unwrap();
        assert_eq!(mgr.bridge("br-lan").unwrap().state(), BridgeState::Down);

        mgr.process_port_state("eth0", true).await.unwrap();

        let bridge = mgr.bridge("br-lan").unwrap();
        assert!(bridge.is_active());
        assert_eq!(
            control.calls(),
            vec![
                ControlPlaneCall::CreateBridge("br-lan".into(), None),
                ControlPlaneCall::AttachPort("br-lan".into(), "eth0".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_auto_activate_waits_for_request() {
        let (mgr, control, _) = new_mgr();
        let mut mgr = mgr.with_auto_activate(false);
        mgr.process_bridge_set("br-lan", &field_values! { "ovs_empty" => "true" })
            .await
            .unwrap();
        assert!(control.calls().is_empty());

        mgr.set_activation("br-lan", true).await.unwrap();
        assert!(mgr.bridge("br-lan").unwrap().is_active());

        mgr.set_activation("br-lan", false).await.unwrap();
        assert!(!mgr.bridge("br-lan").unwrap().is_active());

        assert!(matches!(
            mgr.set_activation("br-wan", true).await,
            Err(CfgMgrError::BridgeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_restart_recreates_bridge() {
        let (mut mgr, control, table) = new_mgr();
        mgr.process_port_state("eth0", true).await.unwrap();
        mgr.process_bridge_set("br-lan", &field_values! { "ifname" => "eth0" })
            .await
            .unwrap();
        control.clear();

        mgr.process_bridge_set(
            "br-lan",
            &field_values! { "ifname" => "eth0", "ovs_type" => "internal" },
        )
        .await
        .unwrap();

        assert_eq!(
            control.calls(),
            vec![
                ControlPlaneCall::DetachPort("br-lan".into(), "eth0".into()),
                ControlPlaneCall::DeleteBridge("br-lan".into()),
                ControlPlaneCall::CreateBridge("br-lan".into(), None),
                ControlPlaneCall::AttachPort("br-lan".into(), "eth0".into()),
                ControlPlaneCall::SetPortType("eth0".into(), "internal".into()),
            ]
        );
        assert!(mgr.bridge("br-lan").unwrap().is_active());
        assert_eq!(table.claimed_by("eth0").as_deref(), Some("br-lan"));
    }

    #[tokio::test]
    async fn test_invalid_config_keeps_bridge() {
        let (mut mgr, _, _) = new_mgr();
        mgr.process_bridge_set("br-lan", &field_values! { "ifname" => "eth0" })
            .await
            .unwrap();

        let err = mgr
            .process_bridge_set("br-lan", &field_values! { "ovs_tag" => "x", "ovs_base" => "b" })
            .await
            .unwrap_err();
        assert!(matches!(err, CfgMgrError::InvalidConfig { .. }));
        assert!(mgr.bridge("br-lan").unwrap().port("eth0").is_some());

        assert!(mgr
            .process_bridge_set("br-wan", &field_values! { "ovs_empty" => "maybe" })
            .await
            .is_err());
        assert!(mgr.bridge("br-wan").is_none());
    }

    #[tokio::test]
    async fn test_port_moves_to_second_bridge_on_removal() {
        let (mut mgr, _, table) = new_mgr();
        mgr.process_port_state("eth0", true).await.unwrap();
        mgr.process_port_state("eth1", true).await.unwrap();
        mgr.process_bridge_set("br-a", &field_values! { "ifname" => "eth0" })
            .await
            .unwrap();
        mgr.process_bridge_set("br-b", &field_values! { "ifname" => "eth0 eth1" })
            .await
            .unwrap();

        let b = mgr.bridge("br-b").unwrap();
        assert_eq!(b.present_port_count(), 1);
        assert!(!b.port("eth0").unwrap().is_present());
        assert_eq!(table.claimed_by("eth0").as_deref(), Some("br-a"));

        mgr.process_bridge_del("br-a").await.unwrap();

        let b = mgr.bridge("br-b").unwrap();
        assert!(b.port("eth0").unwrap().is_attached());
        assert_eq!(b.present_port_count(), 2);
        assert_eq!(table.claimed_by("eth0").as_deref(), Some("br-b"));
    }

    #[tokio::test]
    async fn test_pseudo_bridge_follows_managed_base() {
        let (mut mgr, control, _) = new_mgr();
        mgr.process_bridge_set(
            "br-vlan10",
            &field_values! { "ovs_base" => "br-core", "ovs_tag" => "10", "ovs_empty" => "1" },
        )
        .await
        .unwrap();
        assert!(!mgr.bridge("br-vlan10").unwrap().is_present());

        mgr.process_bridge_set("br-core", &field_values! { "ovs_empty" => "true" })
            .await
            .unwrap();

        assert!(mgr.bridge("br-vlan10").unwrap().is_active());
        assert_eq!(
            creates(&control),
            vec![
                ControlPlaneCall::CreateBridge("br-core".into(), None),
                ControlPlaneCall::CreateBridge("br-vlan10".into(), Some(("br-core".into(), 10))),
            ]
        );
        assert_eq!(mgr.monitored_devices(), Vec::<String>::new());

        mgr.process_bridge_del("br-core").await.unwrap();
        assert!(!mgr.bridge("br-vlan10").unwrap().is_present());
        assert!(!mgr.bridge("br-vlan10").unwrap().is_active());
    }

    #[tokio::test]
    async fn test_member_table_hotplug() {
        let (mut mgr, control, _) = new_mgr();
        mgr.process_bridge_set("br-lan", &Vec::new()).await.unwrap();
        assert!(control.calls().is_empty());

        mgr.process_entry(
            CFG_OVS_BRIDGE_MEMBER_TABLE_NAME,
            KeyOpFieldsValues::set("br-lan|tap0", Vec::new()),
        )
        .await
        .unwrap();
        assert!(mgr.bridge("br-lan").unwrap().is_active());
        assert_eq!(mgr.monitored_devices(), vec!["tap0".to_string()]);

        mgr.process_entry(STATE_PORT_TABLE_NAME, KeyOpFieldsValues::set("tap0", Vec::new()))
            .await
            .unwrap();
        assert!(mgr.bridge("br-lan").unwrap().port("tap0").unwrap().is_attached());

        mgr.process_entry(
            CFG_OVS_BRIDGE_MEMBER_TABLE_NAME,
            KeyOpFieldsValues::del("br-lan|tap0"),
        )
        .await
        .unwrap();
        assert!(mgr.bridge("br-lan").unwrap().port("tap0").is_none());

        // Unknown member removal is only logged.
        tokio_test::assert_ok!(
            mgr.process_entry(
                CFG_OVS_BRIDGE_MEMBER_TABLE_NAME,
                KeyOpFieldsValues::del("br-lan|tap0"),
            )
            .await
        );
        assert!(matches!(
            mgr.process_entry(
                CFG_OVS_BRIDGE_MEMBER_TABLE_NAME,
                KeyOpFieldsValues::set("br-wan|tap0", Vec::new()),
            )
            .await,
            Err(CfgMgrError::BridgeNotFound { .. })
        ));
        assert!(matches!(
            mgr.process_entry(
                CFG_OVS_BRIDGE_MEMBER_TABLE_NAME,
                KeyOpFieldsValues::set("br-lan", Vec::new()),
            )
            .await,
            Err(CfgMgrError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_bridge_del_and_status() {
        let (mut mgr, _, table) = new_mgr();
        mgr.process_port_state("eth0", true).await.unwrap();
        mgr.process_entry(
            CFG_OVS_BRIDGE_TABLE_NAME,
            KeyOpFieldsValues::set("br-lan", field_values! { "ifname" => "eth0" }),
        )
        .await
        .unwrap();

        let status = mgr.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].attached_ports, vec!["eth0".to_string()]);

        mgr.process_entry(CFG_OVS_BRIDGE_TABLE_NAME, KeyOpFieldsValues::del("br-lan"))
            .await
            .unwrap();
        assert!(mgr.status().is_empty());
        assert_eq!(table.claimed_by("eth0"), None);
        assert!(!table.is_present("br-lan"));

        tokio_test::assert_ok!(mgr.process_bridge_del("br-lan").await);
    }
}
