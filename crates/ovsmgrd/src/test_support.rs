//! Test doubles for the control plane and the device framework

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

use crate::control_plane::ControlPlane;
use crate::device::{Association, DeviceFramework, LinkTable};

/// One recorded control-plane operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    CreateBridge(String, Option<(String, u32)>),
    DeleteBridge(String),
    AttachPort(String, String),
    DetachPort(String, String),
    SetPortType(String, String),
    SetPortOptions(String, String),
}

#[derive(Debug, Default)]
struct Failures {
    create_bridge: bool,
    attach_port: HashSet<String>,
    set_port_type: HashSet<String>,
    set_port_options: HashSet<String>,
}

/// Records every call and fails the ones it was told to.
#[derive(Debug, Default)]
pub struct RecordingControlPlane {
    calls: Mutex<Vec<ControlPlaneCall>>,
    failures: Mutex<Failures>,
}

impl RecordingControlPlane {
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_create_bridge(&self) {
        self.failures.lock().create_bridge = true;
    }

    pub fn fail_attach_port(&self, port: &str) {
        self.failures.lock().attach_port.insert(port.to_string());
    }

    pub fn fail_set_port_type(&self, port: &str) {
        self.failures.lock().set_port_type.insert(port.to_string());
    }

    pub fn fail_set_port_options(&self, port: &str) {
        self.failures.lock().set_port_options.insert(port.to_string());
    }

    fn record(&self, call: ControlPlaneCall, fail: bool) -> CfgMgrResult<()> {
        let command = format!("{:?}", call);
        self.calls.lock().push(call);
        if fail {
            return Err(CfgMgrError::ShellCommandFailed {
                command,
                exit_code: 1,
                output: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn create_bridge(&self, bridge: &str, pseudo: Option<(&str, u32)>) -> CfgMgrResult<()> {
        let fail = self.failures.lock().create_bridge;
        let pseudo = pseudo.map(|(base, tag)| (base.to_string(), tag));
        self.record(ControlPlaneCall::CreateBridge(bridge.to_string(), pseudo), fail)
    }

    async fn delete_bridge(&self, bridge: &str) -> CfgMgrResult<()> {
        self.record(ControlPlaneCall::DeleteBridge(bridge.to_string()), false)
    }

    async fn attach_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        let fail = self.failures.lock().attach_port.contains(port);
        self.record(
            ControlPlaneCall::AttachPort(bridge.to_string(), port.to_string()),
            fail,
        )
    }

    async fn detach_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        self.record(
            ControlPlaneCall::DetachPort(bridge.to_string(), port.to_string()),
            false,
        )
    }

    async fn set_port_type(&self, port: &str, port_type: &str) -> CfgMgrResult<()> {
        let fail = self.failures.lock().set_port_type.contains(port);
        self.record(
            ControlPlaneCall::SetPortType(port.to_string(), port_type.to_string()),
            fail,
        )
    }

    async fn set_port_options(&self, port: &str, options: &str) -> CfgMgrResult<()> {
        let fail = self.failures.lock().set_port_options.contains(port);
        self.record(
            ControlPlaneCall::SetPortOptions(port.to_string(), options.to_string()),
            fail,
        )
    }
}

/// [`LinkTable`] wrapper whose activation signal can be made to fail.
pub struct GatedFramework {
    pub table: Arc<LinkTable>,
    reject_activation: AtomicBool,
}

impl GatedFramework {
    pub fn new(table: Arc<LinkTable>) -> Self {
        Self {
            table,
            reject_activation: AtomicBool::new(false),
        }
    }

    pub fn reject_activation(&self, reject: bool) {
        self.reject_activation.store(reject, Ordering::SeqCst);
    }
}

impl DeviceFramework for GatedFramework {
    fn claim(&self, device: &str, owner: &str) -> CfgMgrResult<()> {
        self.table.claim(device, owner)
    }

    fn release(&self, device: &str, owner: &str) {
        self.table.release(device, owner)
    }

    fn add_association(&self, device: &str, association: Association) -> bool {
        self.table.add_association(device, association)
    }

    fn remove_association(&self, device: &str, association: &Association) {
        self.table.remove_association(device, association)
    }

    fn is_present(&self, device: &str) -> bool {
        self.table.is_present(device)
    }

    fn set_present(&self, device: &str, present: bool) {
        self.table.set_present(device, present)
    }

    fn set_active(&self, device: &str, active: bool) -> CfgMgrResult<()> {
        if active && self.reject_activation.load(Ordering::SeqCst) {
            return Err(CfgMgrError::activation_rejected(device, "link up refused"));
        }
        self.table.set_active(device, active)
    }
}
