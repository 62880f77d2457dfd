//! Per-command tuning options

use serde::{Deserialize, Serialize};

/// Optional per-command overrides of the session-wide vote policy
///
/// Every field falls back to the session default when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOptions {
    /// Votes needed inside the window to fire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,

    /// Sliding vote window, in seconds
    #[serde(default, alias = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,

    /// Cooldown after a fire, in seconds
    #[serde(default, alias = "wait", skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<f64>,

    /// Re-enable this command on the `start` host command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_on_start: Option<bool>,

    /// Ignore crowd votes; only privileged users can trigger it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged_only: Option<bool>,
}

impl CommandOptions {
    /// Field-by-field overlay: values set in `top` win
    pub fn overlay(&self, top: &CommandOptions) -> CommandOptions {
        CommandOptions {
            threshold: top.threshold.or(self.threshold),
            timeout_seconds: top.timeout_seconds.or(self.timeout_seconds),
            wait_seconds: top.wait_seconds.or(self.wait_seconds),
            enabled_on_start: top.enabled_on_start.or(self.enabled_on_start),
            privileged_only: top.privileged_only.or(self.privileged_only),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CommandOptions::default()
    }
}
