//! Device framework interface and its in-process implementation
//!
//! Bridges never own their member devices. They register an
//! [`Association`] with the framework, claim a device while it is attached
//! and release it afterwards. Presence changes of a device are delivered to
//! every association as a [`LinkNotification`] through one serial queue.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

/// What a device is to the bridge that registered interest in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Forwarding port
    Port,
    /// Parent of a pseudo-bridge
    Base,
}

/// Dispatch key of a registered interest: which bridge, in which role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Association {
    /// Owning bridge name
    pub bridge: String,
    /// Role of the device in that bridge
    pub role: MemberRole,
}

impl Association {
    /// Port association of `bridge`.
    pub fn port(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            role: MemberRole::Port,
        }
    }

    /// Base association of `bridge`.
    pub fn base(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            role: MemberRole::Base,
        }
    }
}

/// Presence change of an associated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Device became available
    Added,
    /// Device went away
    Removed,
}

/// A [`LinkEvent`] addressed to one association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNotification {
    /// Receiver of the event
    pub association: Association,
    /// Device the event is about
    pub device: String,
    /// The event
    pub event: LinkEvent,
}

/// Device framework contract consumed by bridge controllers.
pub trait DeviceFramework: Send + Sync {
    /// Claims exclusive attachment intent on `device` for `owner`.
    fn claim(&self, device: &str, owner: &str) -> CfgMgrResult<()>;

    /// Releases a claim taken by `owner`.
    fn release(&self, device: &str, owner: &str);

    /// Registers interest in `device`; returns whether it is present now.
    ///
    /// Only later presence changes are notified.
    fn add_association(&self, device: &str, association: Association) -> bool;

    /// Drops interest in `device`.
    fn remove_association(&self, device: &str, association: &Association);

    /// Returns true if `device` is currently present.
    fn is_present(&self, device: &str) -> bool;

    /// Sets the presence of `device`, notifying its associations on change.
    fn set_present(&self, device: &str, present: bool);

    /// Records whether the bridge device `device` is active.
    fn set_active(&self, device: &str, active: bool) -> CfgMgrResult<()>;
}

#[derive(Debug, Default)]
struct LinkEntry {
    present: bool,
    active: bool,
    claimed_by: Option<String>,
    users: Vec<Association>,
}

/// In-process [`DeviceFramework`].
///
/// Tracks every device referenced by a bridge (members, bases and the
/// bridges themselves) and queues notifications for the manager loop.
#[derive(Debug)]
pub struct LinkTable {
    links: Mutex<BTreeMap<String, LinkEntry>>,
    notifier: UnboundedSender<LinkNotification>,
}

impl LinkTable {
    /// Creates an empty table and the receiving end of its notification queue.
    pub fn new() -> (Self, UnboundedReceiver<LinkNotification>) {
        let (notifier, receiver) = mpsc::unbounded_channel();
        let table = Self {
            links: Mutex::new(BTreeMap::new()),
            notifier,
        };
        (table, receiver)
    }

    /// Current claim holder of `device`.
    pub fn claimed_by(&self, device: &str) -> Option<String> {
        self.links
            .lock()
            .get(device)
            .and_then(|entry| entry.claimed_by.clone())
    }

    /// Returns true if `device` was marked active.
    pub fn is_active(&self, device: &str) -> bool {
        self.links.lock().get(device).is_some_and(|entry| entry.active)
    }

    /// Associations registered on `device`.
    pub fn associations(&self, device: &str) -> Vec<Association> {
        self.links
            .lock()
            .get(device)
            .map(|entry| entry.users.clone())
            .unwrap_or_default()
    }
}

impl DeviceFramework for LinkTable {
    fn claim(&self, device: &str, owner: &str) -> CfgMgrResult<()> {
        let mut links = self.links.lock();
        let entry = links
            .get_mut(device)
            .filter(|entry| entry.present)
            .ok_or_else(|| CfgMgrError::device_not_found(device))?;

        match &entry.claimed_by {
            Some(holder) if holder != owner => Err(CfgMgrError::device_busy(device, holder.clone())),
            _ => {
                entry.claimed_by = Some(owner.to_string());
                Ok(())
            }
        }
    }

    fn release(&self, device: &str, owner: &str) {
        let mut links = self.links.lock();
        match links.get_mut(device) {
            Some(entry) if entry.claimed_by.as_deref() == Some(owner) => entry.claimed_by = None,
            _ => debug!("{} holds no claim on {}", owner, device),
        }
    }

    fn add_association(&self, device: &str, association: Association) -> bool {
        let mut links = self.links.lock();
        let entry = links.entry(device.to_string()).or_default();
        if !entry.users.contains(&association) {
            entry.users.push(association);
        }
        entry.present
    }

    fn remove_association(&self, device: &str, association: &Association) {
        if let Some(entry) = self.links.lock().get_mut(device) {
            entry.users.retain(|user| user != association);
        }
    }

    fn is_present(&self, device: &str) -> bool {
        self.links.lock().get(device).is_some_and(|entry| entry.present)
    }

    fn set_present(&self, device: &str, present: bool) {
        let users = {
            let mut links = self.links.lock();
            let entry = links.entry(device.to_string()).or_default();
            if entry.present == present {
                return;
            }
            entry.present = present;
            if !present {
                entry.active = false;
            }
            entry.users.clone()
        };

        debug!(
            "Device {} is now {}",
            device,
            if present { "present" } else { "absent" }
        );

        let event = if present {
            LinkEvent::Added
        } else {
            LinkEvent::Removed
        };
        for association in users {
            let notification = LinkNotification {
                association,
                device: device.to_string(),
                event,
            };
            if self.notifier.send(notification).is_err() {
                debug!("Notification queue closed, dropping event for {}", device);
            }
        }
    }

    fn set_active(&self, device: &str, active: bool) -> CfgMgrResult<()> {
        let mut links = self.links.lock();
        let entry = links
            .get_mut(device)
            .ok_or_else(|| CfgMgrError::device_not_found(device))?;
        entry.active = active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_claim_is_exclusive() {
        let (table, _rx) = LinkTable::new();
        table.set_present("eth0", true);

        assert!(table.claim("eth0", "br-a").is_ok());
        assert!(table.claim("eth0", "br-a").is_ok());
        assert!(matches!(
            table.claim("eth0", "br-b"),
            Err(CfgMgrError::DeviceBusy { .. })
        ));

        table.release("eth0", "br-b");
        assert_eq!(table.claimed_by("eth0").as_deref(), Some("br-a"));

        table.release("eth0", "br-a");
        assert!(table.claim("eth0", "br-b").is_ok());
    }

    #[test]
    fn test_claim_requires_present_device() {
        let (table, _rx) = LinkTable::new();
        assert!(matches!(
            table.claim("eth9", "br-a"),
            Err(CfgMgrError::DeviceNotFound { .. })
        ));

        table.add_association("eth9", Association::port("br-a"));
        assert!(table.claim("eth9", "br-a").is_err());
    }

    #[test]
    fn test_presence_change_notifies_associations() {
        let (table, mut rx) = LinkTable::new();
        assert!(!table.add_association("eth0", Association::port("br-a")));
        assert!(!table.add_association("eth0", Association::base("br-b")));

        table.set_present("eth0", true);
        table.set_present("eth0", true);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.association, Association::port("br-a"));
        assert_eq!(first.event, LinkEvent::Added);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.association, Association::base("br-b"));
        assert!(rx.try_recv().is_err());

        table.remove_association("eth0", &Association::port("br-a"));
        table.set_present("eth0", false);
        let only = rx.try_recv().unwrap();
        assert_eq!(only.association.role, MemberRole::Base);
        assert_eq!(only.event, LinkEvent::Removed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_add_association_reports_presence() {
        let (table, _rx) = LinkTable::new();
        table.set_present("eth1", true);
        assert!(table.add_association("eth1", Association::port("br-a")));
        assert_eq!(table.associations("eth1"), vec![Association::port("br-a")]);
    }

    #[test]
    fn test_set_active_tracks_bridge() {
        let (table, _rx) = LinkTable::new();
        assert!(table.set_active("br-a", true).is_err());

        table.set_present("br-a", true);
        table.set_active("br-a", true).unwrap();
        assert!(table.is_active("br-a"));

        table.set_present("br-a", false);
        assert!(!table.is_active("br-a"));
    }
}
