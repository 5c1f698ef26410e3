//! Error types for cfgmgr operations.
//!
//! This module defines the error types used throughout the cfgmgr crates.
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for cfgmgr operations.
pub type CfgMgrResult<T> = Result<T, CfgMgrError>;

/// Errors that can occur during cfgmgr operations.
#[derive(Debug, Error)]
pub enum CfgMgrError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Device is already claimed by another owner.
    #[error("Device '{device}' is busy (claimed by '{owner}')")]
    DeviceBusy {
        /// The device name.
        device: String,
        /// The current claim holder.
        owner: String,
    },

    /// Device is unknown to the device framework.
    #[error("Device '{device}' not found")]
    DeviceNotFound {
        /// The device name.
        device: String,
    },

    /// Bridge is not managed by this daemon.
    #[error("Bridge '{bridge}' not found")]
    BridgeNotFound {
        /// The bridge name.
        bridge: String,
    },

    /// Bridge activation was attempted while the bridge is not present.
    #[error("Bridge '{bridge}' is not present")]
    NotPresent {
        /// The bridge name.
        bridge: String,
    },

    /// No member could be attached and the bridge may not run empty.
    #[error("Bridge '{bridge}' has no usable members")]
    NoUsableMembers {
        /// The bridge name.
        bridge: String,
    },

    /// The device framework refused to mark the bridge active.
    #[error("Activation of '{bridge}' rejected: {message}")]
    ActivationRejected {
        /// The bridge name.
        bridge: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl CfgMgrError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a device busy error.
    pub fn device_busy(device: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::DeviceBusy {
            device: device.into(),
            owner: owner.into(),
        }
    }

    /// Creates a device not found error.
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    /// Creates a bridge not found error.
    pub fn bridge_not_found(bridge: impl Into<String>) -> Self {
        Self::BridgeNotFound {
            bridge: bridge.into(),
        }
    }

    /// Creates an activation rejected error.
    pub fn activation_rejected(bridge: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActivationRejected {
            bridge: bridge.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CfgMgrError::DeviceBusy { .. }
                | CfgMgrError::NoUsableMembers { .. }
                | CfgMgrError::ShellCommandFailed { .. }
        )
    }
}
