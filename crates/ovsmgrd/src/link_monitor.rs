//! Link presence probe
//!
//! A network device is present while `<root>/<device>` exists, root being
//! `/sys/class/net` on a live system.

use std::path::PathBuf;

use tracing::debug;

use crate::device::DeviceFramework;

/// Default sysfs directory listing network devices
pub const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

/// Polls device presence and feeds changes into the framework.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    root: PathBuf,
}

impl LinkMonitor {
    /// Creates a monitor probing below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns true if `device` currently exists.
    pub fn is_link_present(&self, device: &str) -> bool {
        if device.is_empty() || device == "." || device == ".." || device.contains('/') {
            return false;
        }
        self.root.join(device).exists()
    }

    /// Probes every device and updates its presence where it changed.
    ///
    /// Returns the number of devices whose presence changed.
    pub fn poll<'a, I>(&self, devices: I, framework: &dyn DeviceFramework) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut changed = 0;
        for device in devices {
            let present = self.is_link_present(device);
            if framework.is_present(device) != present {
                debug!("Link {} {}", device, if present { "appeared" } else { "vanished" });
                framework.set_present(device, present);
                changed += 1;
            }
        }
        changed
    }
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_NET)
    }
}
